use domain::ErrorKind;
use thiserror::Error;

/// Errors that can occur when interacting with the marketplace store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional write found the record in an unexpected state, or a
    /// uniqueness rule rejected the write.
    #[error("Conflicting write to {entity} {id}: {reason}")]
    Conflict {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A stored row could not be mapped back onto a domain type.
    #[error("Corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(
        entity: &'static str,
        id: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        StoreError::Conflict {
            entity,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(
        entity: &'static str,
        id: impl std::fmt::Display,
        reason: impl std::fmt::Display,
    ) -> Self {
        StoreError::Corrupt {
            entity,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Conflict { .. } => ErrorKind::StateConflict,
            StoreError::Corrupt { .. }
            | StoreError::Database(_)
            | StoreError::Migration(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
