//! The in-memory board snapshot and the drag interaction machinery.
//!
//! `BoardState` is the single owned copy of one board view's columns and
//! cards. Drag interactions mutate it optimistically; the store is only
//! touched on load and commit. The render layer observes, never mutates.

pub mod drag;

use crate::errors::{LoadError, WriteError};
use crate::store::{CardPlacement, ColumnView, DbHandle};

/// Owned, per-board-view snapshot of columns and their ordered cards.
///
/// There is no ambient or shared state: a `BoardState` is created by
/// [`BoardState::load`], handed to the drag controller for the lifetime of
/// one board view, and discarded with it.
#[derive(Debug, Clone)]
pub struct BoardState {
    board_id: i64,
    columns: Vec<ColumnView>,
}

impl BoardState {
    /// Fetch the full nested snapshot for a board.
    ///
    /// Either every column arrives with its complete card list, or the load
    /// fails as a whole; a partially populated board is never constructed.
    pub async fn load(db: &DbHandle, board_id: i64) -> Result<Self, LoadError> {
        let view = db
            .call(move |db| db.board_view(board_id))
            .await
            .map_err(LoadError::Store)?
            .ok_or(LoadError::BoardNotFound { id: board_id })?;
        Ok(Self {
            board_id: view.board.id,
            columns: view.columns,
        })
    }

    /// Replace this snapshot with a fresh read of the same board.
    pub async fn reload(&mut self, db: &DbHandle) -> Result<(), LoadError> {
        *self = Self::load(db, self.board_id).await?;
        Ok(())
    }

    pub fn board_id(&self) -> i64 {
        self.board_id
    }

    pub fn columns(&self) -> &[ColumnView] {
        &self.columns
    }

    /// The column currently holding a card, if the card is on this board.
    pub fn column_of(&self, card_id: i64) -> Option<i64> {
        self.columns
            .iter()
            .find(|col| col.cards.iter().any(|card| card.id == card_id))
            .map(|col| col.column.id)
    }

    pub fn has_column(&self, column_id: i64) -> bool {
        self.columns.iter().any(|col| col.column.id == column_id)
    }

    /// Number of cards currently in a column, if the column exists.
    pub fn card_count(&self, column_id: i64) -> Option<usize> {
        self.columns
            .iter()
            .find(|col| col.column.id == column_id)
            .map(|col| col.cards.len())
    }

    /// Index of a card within its column's sequence.
    pub fn index_of(&self, card_id: i64) -> Option<usize> {
        self.columns
            .iter()
            .find_map(|col| col.cards.iter().position(|card| card.id == card_id))
    }

    /// Remove the card from the source column's sequence and insert it into
    /// the destination column's sequence at `dest_index`.
    ///
    /// Purely local; the store is not touched. Moving a card to the position
    /// it already occupies leaves the snapshot structurally unchanged.
    /// Unknown ids make the call a no-op rather than an error — mid-drag
    /// hover events can race a concurrent reload and carry stale targets.
    pub fn apply_local_move(
        &mut self,
        card_id: i64,
        source_column_id: i64,
        dest_column_id: i64,
        dest_index: usize,
    ) {
        let Some(source) = self
            .columns
            .iter()
            .position(|col| col.column.id == source_column_id)
        else {
            return;
        };
        let Some(card_index) = self.columns[source]
            .cards
            .iter()
            .position(|card| card.id == card_id)
        else {
            return;
        };
        let Some(dest) = self
            .columns
            .iter()
            .position(|col| col.column.id == dest_column_id)
        else {
            return;
        };

        let mut card = self.columns[source].cards.remove(card_index);
        card.column_id = dest_column_id;
        let dest = &mut self.columns[dest];
        let index = dest_index.min(dest.cards.len());
        dest.cards.insert(index, card);
    }

    /// Derive every card's `(column_id, order)` pair from its current cache
    /// position. Orders are the per-column sequence indexes, so each column
    /// yields a contiguous `0..N-1` range by construction.
    pub fn placements(&self) -> Vec<CardPlacement> {
        let mut placements = Vec::new();
        for col in &self.columns {
            for (index, card) in col.cards.iter().enumerate() {
                placements.push(CardPlacement {
                    id: card.id,
                    column_id: col.column.id,
                    order: index as i64,
                });
            }
        }
        placements
    }

    /// Persist the current arrangement as one batch-intent write.
    ///
    /// On failure nothing is un-done locally; the caller resynchronizes with
    /// [`BoardState::reload`].
    pub async fn commit(&self, db: &DbHandle) -> Result<(), WriteError> {
        let placements = self.placements();
        db.call(move |db| db.reorder_cards(&placements))
            .await
            .map_err(WriteError::Store)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
