//! Persistent store: the five tracker tables behind a small typed API.
//!
//! `TrackerDb` owns the SQLite connection; `DbHandle` makes it safe to call
//! from async contexts. Everything the rest of the crate knows about
//! persistence goes through these two types.

pub mod db;
pub mod models;

pub use db::{CardChanges, COLUMN_TEMPLATE, DbHandle, TrackerDb};
pub use models::*;
