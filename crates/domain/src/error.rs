//! Error taxonomy shared by every marketplace crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of failure surfaced to callers.
///
/// Every crate-level error type exposes a `kind()` so the HTTP layer can render
/// `{kind, message}` bodies without knowing each crate's variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state change.
    ValidationError,
    /// Illegal transition, lost race, or inventory sold out at commit.
    StateConflict,
    /// A payment callback failed its authenticity check.
    SignatureInvalid,
    /// The payment gateway failed or timed out.
    GatewayUnavailable,
    /// Unknown listing or order.
    NotFound,
    /// Matching was requested for a listing without coordinates.
    NoLocationData,
    /// No valid credential was presented.
    Unauthorized,
    /// The principal's role or identity does not permit the operation.
    Forbidden,
    /// Anything else (storage failures, corrupt rows).
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::StateConflict => "StateConflict",
            ErrorKind::SignatureInvalid => "SignatureInvalid",
            ErrorKind::GatewayUnavailable => "GatewayUnavailable",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::NoLocationData => "NoLocationData",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input that fails validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required text field is empty or blank.
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    /// A quantity that must be strictly positive is not.
    #[error("quantity must be greater than 0")]
    NonPositiveQuantity,

    /// A quantity is negative, NaN or infinite.
    #[error("invalid quantity: {value} kg")]
    InvalidQuantity { value: f64 },

    /// A price that must be strictly positive is not.
    #[error("price per kg must be greater than 0")]
    NonPositivePrice,

    /// A money amount is NaN, infinite or negative.
    #[error("invalid amount: {value}")]
    InvalidAmount { value: f64 },

    /// Arithmetic on a money amount overflowed.
    #[error("amount is too large")]
    AmountOverflow,

    /// Latitude or longitude is out of range.
    #[error("invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    /// A service radius is zero, negative or not finite.
    #[error("service radius must be a positive number of kilometres, got {value}")]
    InvalidServiceRadius { value: f64 },

    /// Unknown ISO currency code.
    #[error("unsupported currency: {code}")]
    UnsupportedCurrency { code: String },

    /// A client-supplied value disagrees with the server's computation.
    #[error("{field} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// A string that should name an enum variant does not.
    #[error("unknown {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ValidationError
    }
}

/// Returns an `EmptyField` error if `value` is blank.
pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(())
    }
}
