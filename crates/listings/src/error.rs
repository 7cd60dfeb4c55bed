use domain::{AuthorizationError, ErrorKind, TransitionError, ValidationError};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the listing registry.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid listing: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// The stored state changed between the read and the conditional write.
    #[error("waste listing {id} was modified concurrently, refresh and retry")]
    Conflict { id: String },

    #[error("{0}")]
    Forbidden(#[from] AuthorizationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ListingError {
    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        ListingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ListingError::NotFound { .. } => ErrorKind::NotFound,
            ListingError::Validation(_) => ErrorKind::ValidationError,
            ListingError::Transition(e) => e.kind(),
            ListingError::Conflict { .. } => ErrorKind::StateConflict,
            ListingError::Forbidden(_) => ErrorKind::Forbidden,
            ListingError::Store(e) => e.kind(),
        }
    }
}

/// Errors returned by the matching engine.
#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("waste listing not found: {0}")]
    NotFound(String),

    /// The listing's pickup location was never geocoded.
    #[error("waste listing {0} has no pickup coordinates")]
    NoLocationData(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl MatchingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchingError::NotFound(_) => ErrorKind::NotFound,
            MatchingError::NoLocationData(_) => ErrorKind::NoLocationData,
            MatchingError::Store(e) => e.kind(),
        }
    }
}
