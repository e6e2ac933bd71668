use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use super::models::*;

/// Async-safe handle to the tracker database.
///
/// Wraps `TrackerDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<TrackerDb>>,
}

impl DbHandle {
    pub fn new(db: TrackerDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TrackerDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct TrackerDb {
    conn: Connection,
}

impl TrackerDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    avatar_url TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS boards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    owner_id INTEGER NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS board_members (
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role TEXT NOT NULL DEFAULT 'member',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (board_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS columns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    "order" INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    column_id INTEGER NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT,
                    image_url TEXT,
                    script TEXT,
                    "order" INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_boards_owner ON boards(owner_id);
                CREATE INDEX IF NOT EXISTS idx_members_user ON board_members(user_id);
                CREATE INDEX IF NOT EXISTS idx_columns_board ON columns(board_id, "order");
                CREATE INDEX IF NOT EXISTS idx_cards_column ON cards(column_id, "order");
                "#,
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Execute arbitrary SQL against the underlying connection. Test-only
    /// escape hatch for simulating store failures (e.g. a dropped table).
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).context("Failed to run raw SQL")?;
        Ok(())
    }

    // ── User CRUD ─────────────────────────────────────────────────────

    pub fn create_user(&self, email: &str, name: &str) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (email, name, avatar_url) VALUES (?1, ?2, NULL)",
                params![email, name],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, email, name, avatar_url, created_at FROM users WHERE id = ?1")
            .context("Failed to prepare get_user")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    avatar_url: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query user")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read user row")?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, email, name, avatar_url, created_at FROM users WHERE email = ?1")
            .context("Failed to prepare get_user_by_email")?;
        let mut rows = stmt
            .query_map(params![email], |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    avatar_url: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query user by email")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read user row")?)),
            None => Ok(None),
        }
    }

    /// Team member listing, newest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, email, name, avatar_url, created_at FROM users
                 ORDER BY created_at DESC, id DESC",
            )
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    avatar_url: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.context("Failed to read user row")?);
        }
        Ok(users)
    }

    /// The "current" user. There is no authentication layer; the earliest
    /// record stands in for the signed-in account.
    pub fn first_user(&self) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, email, name, avatar_url, created_at FROM users
                 ORDER BY id ASC LIMIT 1",
            )
            .context("Failed to prepare first_user")?;
        let mut rows = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    avatar_url: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query first user")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read user row")?)),
            None => Ok(None),
        }
    }

    // ── Board CRUD ────────────────────────────────────────────────────

    /// Create a board, its owner membership, and the column template in one
    /// transaction. A board never comes into existence half-seeded.
    pub fn create_board(
        &self,
        title: &str,
        description: Option<&str>,
        owner_id: i64,
    ) -> Result<Board> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        tx.execute(
            "INSERT INTO boards (title, description, owner_id) VALUES (?1, ?2, ?3)",
            params![title, description, owner_id],
        )
        .context("Failed to insert board")?;
        let board_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO board_members (board_id, user_id, role) VALUES (?1, ?2, ?3)",
            params![board_id, owner_id, MemberRole::Owner.as_str()],
        )
        .context("Failed to insert owner membership")?;

        for (order, column_title) in COLUMN_TEMPLATE.iter().enumerate() {
            tx.execute(
                "INSERT INTO columns (board_id, title, \"order\") VALUES (?1, ?2, ?3)",
                params![board_id, column_title, order as i64],
            )
            .with_context(|| format!("Failed to create column {}", column_title))?;
        }

        tx.commit().context("Failed to commit board creation")?;
        self.get_board(board_id)?
            .context("Board not found after insert")
    }

    pub fn get_board(&self, id: i64) -> Result<Option<Board>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, description, owner_id, created_at FROM boards WHERE id = ?1",
            )
            .context("Failed to prepare get_board")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Board {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    owner_id: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query board")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read board row")?)),
            None => Ok(None),
        }
    }

    pub fn list_boards(&self) -> Result<Vec<Board>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, description, owner_id, created_at FROM boards
                 ORDER BY created_at DESC, id DESC",
            )
            .context("Failed to prepare list_boards")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Board {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    owner_id: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query boards")?;
        let mut boards = Vec::new();
        for row in rows {
            boards.push(row.context("Failed to read board row")?);
        }
        Ok(boards)
    }

    pub fn add_board_member(
        &self,
        board_id: i64,
        user_id: i64,
        role: &MemberRole,
    ) -> Result<BoardMember> {
        self.conn
            .execute(
                "INSERT INTO board_members (board_id, user_id, role) VALUES (?1, ?2, ?3)",
                params![board_id, user_id, role.as_str()],
            )
            .context("Failed to insert board member")?;
        Ok(BoardMember {
            board_id,
            user_id,
            role: role.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn list_board_members(&self, board_id: i64) -> Result<Vec<BoardMember>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT board_id, user_id, role, created_at FROM board_members
                 WHERE board_id = ?1 ORDER BY created_at ASC, user_id ASC",
            )
            .context("Failed to prepare list_board_members")?;
        let rows = stmt
            .query_map(params![board_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to query board members")?;
        let mut members = Vec::new();
        for row in rows {
            let (board_id, user_id, role_str, created_at) =
                row.context("Failed to read board member row")?;
            members.push(BoardMember {
                board_id,
                user_id,
                role: MemberRole::from_str(&role_str)
                    .map_err(|e| anyhow::anyhow!(e))
                    .context("Failed to parse member role")?,
                created_at,
            });
        }
        Ok(members)
    }

    // ── Column reads ──────────────────────────────────────────────────

    pub fn list_columns(&self, board_id: i64) -> Result<Vec<Column>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, board_id, title, \"order\", created_at FROM columns
                 WHERE board_id = ?1 ORDER BY \"order\"",
            )
            .context("Failed to prepare list_columns")?;
        let rows = stmt
            .query_map(params![board_id], |row| {
                Ok(Column {
                    id: row.get(0)?,
                    board_id: row.get(1)?,
                    title: row.get(2)?,
                    order: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query columns")?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.context("Failed to read column row")?);
        }
        Ok(columns)
    }

    pub fn get_column(&self, id: i64) -> Result<Option<Column>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, board_id, title, \"order\", created_at FROM columns WHERE id = ?1",
            )
            .context("Failed to prepare get_column")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Column {
                    id: row.get(0)?,
                    board_id: row.get(1)?,
                    title: row.get(2)?,
                    order: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query column")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read column row")?)),
            None => Ok(None),
        }
    }

    // ── Card CRUD ─────────────────────────────────────────────────────

    pub fn create_card(
        &self,
        column_id: i64,
        title: &str,
        description: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Card> {
        // New cards land at the bottom of the column.
        let max_order: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(\"order\"), -1) FROM cards WHERE column_id = ?1",
                params![column_id],
                |row| row.get(0),
            )
            .context("Failed to get max order")?;
        let order = max_order + 1;

        self.conn
            .execute(
                "INSERT INTO cards (column_id, title, description, image_url, script, \"order\")
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
                params![column_id, title, description, image_url, order],
            )
            .context("Failed to insert card")?;
        let id = self.conn.last_insert_rowid();
        self.get_card(id)?.context("Card not found after insert")
    }

    pub fn get_card(&self, id: i64) -> Result<Option<Card>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, column_id, title, description, image_url, script, \"order\", created_at
                 FROM cards WHERE id = ?1",
            )
            .context("Failed to prepare get_card")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Card {
                    id: row.get(0)?,
                    column_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    image_url: row.get(4)?,
                    script: row.get(5)?,
                    order: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })
            .context("Failed to query card")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read card row")?)),
            None => Ok(None),
        }
    }

    pub fn list_cards(&self, column_id: i64) -> Result<Vec<Card>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, column_id, title, description, image_url, script, \"order\", created_at
                 FROM cards WHERE column_id = ?1 ORDER BY \"order\"",
            )
            .context("Failed to prepare list_cards")?;
        let rows = stmt
            .query_map(params![column_id], |row| {
                Ok(Card {
                    id: row.get(0)?,
                    column_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    image_url: row.get(4)?,
                    script: row.get(5)?,
                    order: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })
            .context("Failed to query cards")?;
        let mut cards = Vec::new();
        for row in rows {
            cards.push(row.context("Failed to read card row")?);
        }
        Ok(cards)
    }

    /// Apply a partial card update. `None` leaves a field untouched; for the
    /// optional text fields an empty string clears the value to NULL, which
    /// is how the edit form expresses "removed".
    pub fn update_card(&self, id: i64, changes: &CardChanges) -> Result<Card> {
        // Use unchecked_transaction so all field updates are atomic.
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(title) = &changes.title {
            tx.execute(
                "UPDATE cards SET title = ?1 WHERE id = ?2",
                params![title, id],
            )
            .context("Failed to update card title")?;
        }
        if let Some(description) = &changes.description {
            let value = non_empty(description);
            tx.execute(
                "UPDATE cards SET description = ?1 WHERE id = ?2",
                params![value, id],
            )
            .context("Failed to update card description")?;
        }
        if let Some(image_url) = &changes.image_url {
            let value = non_empty(image_url);
            tx.execute(
                "UPDATE cards SET image_url = ?1 WHERE id = ?2",
                params![value, id],
            )
            .context("Failed to update card image_url")?;
        }
        if let Some(script) = &changes.script {
            let value = non_empty(script);
            tx.execute(
                "UPDATE cards SET script = ?1 WHERE id = ?2",
                params![value, id],
            )
            .context("Failed to update card script")?;
        }
        if let Some(column_id) = changes.column_id {
            tx.execute(
                "UPDATE cards SET column_id = ?1 WHERE id = ?2",
                params![column_id, id],
            )
            .context("Failed to update card column")?;
        }
        if let Some(order) = changes.order {
            tx.execute(
                "UPDATE cards SET \"order\" = ?1 WHERE id = ?2",
                params![order, id],
            )
            .context("Failed to update card order")?;
        }

        tx.commit().context("Failed to commit card update")?;
        self.get_card(id)?.context("Card not found after update")
    }

    /// Reassign a card's column and order in one step.
    pub fn move_card(&self, id: i64, column_id: i64, order: i64) -> Result<Card> {
        self.conn
            .execute(
                "UPDATE cards SET column_id = ?1, \"order\" = ?2 WHERE id = ?3",
                params![column_id, order, id],
            )
            .context("Failed to move card")?;
        self.get_card(id)?.context("Card not found after move")
    }

    pub fn delete_card(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM cards WHERE id = ?1", params![id])
            .context("Failed to delete card")?;
        Ok(count > 0)
    }

    /// Write a batch of `(column_id, order)` placements, one row per card.
    ///
    /// The batch runs inside a single transaction so the store never holds a
    /// half-applied arrangement; callers still treat any failure as "reload
    /// everything" rather than attempting a partial rollback.
    pub fn reorder_cards(&self, placements: &[CardPlacement]) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        for placement in placements {
            tx.execute(
                "UPDATE cards SET column_id = ?1, \"order\" = ?2 WHERE id = ?3",
                params![placement.column_id, placement.order, placement.id],
            )
            .with_context(|| format!("Failed to reorder card {}", placement.id))?;
        }
        tx.commit().context("Failed to commit reorder")?;
        Ok(())
    }

    // ── Board view ────────────────────────────────────────────────────

    /// Assemble the nested columns-with-cards snapshot for one board.
    /// Columns come back ordered, each with its cards ordered; any failed
    /// fetch fails the whole view.
    pub fn board_view(&self, board_id: i64) -> Result<Option<BoardView>> {
        let board = match self.get_board(board_id)? {
            Some(b) => b,
            None => return Ok(None),
        };

        let mut columns = Vec::new();
        for column in self.list_columns(board_id)? {
            let cards = self
                .list_cards(column.id)
                .with_context(|| format!("Failed to fetch cards for column {}", column.id))?;
            columns.push(ColumnView { column, cards });
        }

        Ok(Some(BoardView { board, columns }))
    }
}

/// Stage titles seeded into every new board, in pipeline order.
pub const COLUMN_TEMPLATE: [&str; 6] = [
    "Discarded",
    "Ideating",
    "Scripting",
    "Recording",
    "Editing",
    "Published",
];

/// Partial update for a card. `None` skips the field.
#[derive(Debug, Clone, Default)]
pub struct CardChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub script: Option<String>,
    pub column_id: Option<i64>,
    pub order: Option<i64>,
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

// ── Tests ─────────────────────────────────────────────────────────────
