//! Drag interaction controller.
//!
//! Consumes the three abstract drag lifecycle events and drives the board
//! snapshot through them. Any drag-and-drop front end can be adapted to
//! emit these events; the controller knows nothing about pointers or
//! collision detection.

use super::BoardState;
use crate::errors::WriteError;
use crate::store::DbHandle;

/// What the pointer is currently over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverKind {
    /// Another card; the dragged card takes that card's index.
    Card,
    /// A column's empty drop region; the dragged card goes to the end.
    Column,
}

/// Inbound drag lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEvent {
    Started { card_id: i64 },
    Hovered { target_id: i64, kind: HoverKind },
    Ended { drop_target: Option<i64> },
}

/// Controller state. `Dragging` tracks the one active card and where it
/// came from; `Committing` marks a persistence write in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Dragging {
        card_id: i64,
        origin_column_id: i64,
    },
    Committing,
}

#[derive(Debug)]
pub struct DragController {
    phase: DragPhase,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            phase: DragPhase::Idle,
        }
    }

    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    /// Feed one drag lifecycle event through the state machine.
    ///
    /// `Started` and `Hovered` are synchronous mutations of the snapshot;
    /// `Ended` with a drop target is the only suspension point, committing
    /// the arrangement and resynchronizing on failure.
    pub async fn handle(
        &mut self,
        board: &mut BoardState,
        db: &DbHandle,
        event: DragEvent,
    ) -> Result<(), WriteError> {
        match event {
            DragEvent::Started { card_id } => {
                self.started(board, card_id);
                Ok(())
            }
            DragEvent::Hovered { target_id, kind } => {
                self.hovered(board, target_id, kind);
                Ok(())
            }
            DragEvent::Ended { drop_target } => self.ended(board, db, drop_target).await,
        }
    }

    /// A pointer-drag began over a card. Records the card and its column.
    ///
    /// Nothing stops a new drag from starting while a previous commit is
    /// still in flight; overlapping commits are not serialized and the last
    /// one to resolve wins. That race is inherited, not mitigated.
    fn started(&mut self, board: &BoardState, card_id: i64) {
        let Some(origin_column_id) = board.column_of(card_id) else {
            return;
        };
        self.phase = DragPhase::Dragging {
            card_id,
            origin_column_id,
        };
    }

    /// The pointer moved over a card or a column's empty drop region.
    /// Recomputes the tentative arrangement; identical targets yield the
    /// same arrangement, so repeated events are harmless.
    fn hovered(&mut self, board: &mut BoardState, target_id: i64, kind: HoverKind) {
        let DragPhase::Dragging { card_id, .. } = self.phase else {
            return;
        };
        let Some(current_column) = board.column_of(card_id) else {
            return;
        };

        match kind {
            HoverKind::Card => {
                let Some(over_column) = board.column_of(target_id) else {
                    return;
                };
                let Some(over_index) = board.index_of(target_id) else {
                    return;
                };
                board.apply_local_move(card_id, current_column, over_column, over_index);
            }
            HoverKind::Column => {
                // Hovering the card's own column is not a move.
                if target_id == current_column {
                    return;
                }
                let Some(end) = board.card_count(target_id) else {
                    return;
                };
                board.apply_local_move(card_id, current_column, target_id, end);
            }
        }
    }

    /// The pointer-drag ended. With no drop target the tentative local
    /// arrangement is simply abandoned to the next reload; with one, the
    /// whole arrangement is committed and a failed write triggers a full
    /// resynchronization instead of a rollback.
    async fn ended(
        &mut self,
        board: &mut BoardState,
        db: &DbHandle,
        drop_target: Option<i64>,
    ) -> Result<(), WriteError> {
        if !matches!(self.phase, DragPhase::Dragging { .. }) {
            return Ok(());
        }
        if drop_target.is_none() {
            self.phase = DragPhase::Idle;
            return Ok(());
        }

        self.phase = DragPhase::Committing;
        let result = board.commit(db).await;
        self.phase = DragPhase::Idle;

        if let Err(err) = result {
            tracing::warn!(board_id = board.board_id(), error = %err, "commit failed, reloading board");
            if let Err(reload_err) = board.reload(db).await {
                tracing::warn!(board_id = board.board_id(), error = %reload_err, "resync reload failed");
            }
            return Err(err);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
