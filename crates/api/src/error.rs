//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{ErrorKind, ValidationError};
use listings::{ListingError, MatchingError};
use serde::Serialize;
use settlement::SettlementError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown bearer token.
    Unauthorized(String),
    /// Malformed request that never reached a service.
    BadRequest(String),
    Listing(ListingError),
    Matching(MatchingError),
    Settlement(SettlementError),
}

#[derive(Serialize)]
struct ReconciliationBody {
    order_id: String,
    reason: String,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reconciliation: Option<ReconciliationBody>,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::BadRequest(_) => ErrorKind::ValidationError,
            ApiError::Listing(e) => e.kind(),
            ApiError::Matching(e) => e.kind(),
            ApiError::Settlement(e) => e.kind(),
        }
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError | ErrorKind::SignatureInvalid => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StateConflict => StatusCode::CONFLICT,
        ErrorKind::NoLocationData => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::GatewayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        let reconciliation = match &self {
            ApiError::Settlement(e) => e.reconciliation_order().map(|order| ReconciliationBody {
                order_id: order.id.to_string(),
                reason: order
                    .reconciliation
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
            }),
            _ => None,
        };

        let message = match &self {
            ApiError::Unauthorized(msg) | ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Listing(e) => e.to_string(),
            ApiError::Matching(e) => e.to_string(),
            ApiError::Settlement(e) => e.to_string(),
        };

        // Internal details stay in the logs.
        let message = if kind == ErrorKind::Internal {
            tracing::error!(error = %message, "internal server error");
            "internal server error".to_string()
        } else {
            message
        };

        let body = ErrorBody {
            kind: kind.as_str(),
            message,
            reconciliation,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ListingError> for ApiError {
    fn from(err: ListingError) -> Self {
        ApiError::Listing(err)
    }
}

impl From<MatchingError> for ApiError {
    fn from(err: MatchingError) -> Self {
        ApiError::Matching(err)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::ValidationError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::SignatureInvalid), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::StateConflict), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorKind::NoLocationData),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(ErrorKind::GatewayUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(ErrorKind::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let err: ApiError = ValidationError::NonPositiveQuantity.into();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
