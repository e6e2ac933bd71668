use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A team member record. There is no authentication layer; users are plain
/// rows keyed by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            _ => Err(format!("Invalid member role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardMember {
    pub board_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub created_at: String,
}

/// A pipeline stage within a board. Columns come from a fixed template at
/// board creation and keep their `order` for the board's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub id: i64,
    pub board_id: i64,
    pub title: String,
    pub order: i64,
    pub created_at: String,
}

/// A unit of content tracked through the pipeline. `description` holds the
/// short blurb shown on the board, `script` the long-form rich-text body,
/// and `image_url` whatever the upload widget handed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub column_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub script: Option<String>,
    pub order: i64,
    pub created_at: String,
}

/// One card's target `(column_id, order)` pair in a batch reorder write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardPlacement {
    pub id: i64,
    pub column_id: i64,
    pub order: i64,
}

// View types assembled for the board screen.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    #[serde(flatten)]
    pub column: Column,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub board: Board,
    pub columns: Vec<ColumnView>,
}
