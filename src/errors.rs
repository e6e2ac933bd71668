//! Typed error hierarchy for the tracker.
//!
//! Three top-level enums cover the three failure classes:
//! - `LoadError` — any read from the store fails; the board view is never
//!   partially populated, the caller surfaces a retry affordance
//! - `WriteError` — a create/update/delete/reorder fails; recovery is a
//!   full board reload, never a per-edit rollback
//! - `ValidationError` — bad form input, caught before any store call

use thiserror::Error;

/// Errors raised while reading board state from the store.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Board {id} not found")]
    BoardNotFound { id: i64 },

    #[error("Failed to read from the store: {0}")]
    Store(#[source] anyhow::Error),
}

/// Errors raised while persisting a mutation.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to write to the store: {0}")]
    Store(#[source] anyhow::Error),
}

/// Form-level validation failures. Raised before the store is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("'{email}' is not a valid email address")]
    InvalidEmail { email: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_board_not_found_carries_id() {
        let err = LoadError::BoardNotFound { id: 7 };
        match &err {
            LoadError::BoardNotFound { id } => assert_eq!(*id, 7),
            _ => panic!("Expected BoardNotFound"),
        }
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn load_error_store_preserves_source() {
        let err = LoadError::Store(anyhow::anyhow!("no such table: cards"));
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn write_error_wraps_store_failures() {
        let store = WriteError::Store(anyhow::anyhow!("disk full"));
        assert!(matches!(store, WriteError::Store(_)));
        assert!(store.to_string().contains("disk full"));
    }

    #[test]
    fn validation_error_required_names_the_field() {
        let err = ValidationError::Required { field: "title" };
        assert_eq!(err.to_string(), "title is required");
    }

    #[test]
    fn validation_error_invalid_email_carries_input() {
        let err = ValidationError::InvalidEmail {
            email: "not-an-address".to_string(),
        };
        assert!(err.to_string().contains("not-an-address"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&LoadError::BoardNotFound { id: 1 });
        assert_std_error(&WriteError::Store(anyhow::anyhow!("x")));
        assert_std_error(&ValidationError::Required { field: "title" });
    }
}
