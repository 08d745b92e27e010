//! Error types for the Observer API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::RelayError;
use tracing::error;

/// Errors that can occur in the Observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested match was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The match is already registered.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request body could not be decoded.
    #[error("invalid body: {0}")]
    InvalidBody(String),

    /// The durable store could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RelayError> for ObserverError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::UnknownMatch(_) => Self::NotFound(err.to_string()),
            RelayError::AlreadyRegistered(_) => Self::Conflict(err.to_string()),
            RelayError::StoreUnavailable(_) => Self::Unavailable(err.to_string()),
            RelayError::MalformedRecord { .. } | RelayError::ObserverUnreachable(_) => {
                error!(error = %err, "Request failed");
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ObserverError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::InvalidBody(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use relay_types::GameId;

    use super::*;

    #[test]
    fn relay_errors_map_to_statuses() {
        let id = GameId::new("m1");
        let cases = [
            (RelayError::UnknownMatch(id.clone()), StatusCode::NOT_FOUND),
            (RelayError::AlreadyRegistered(id), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(ObserverError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn unavailable_is_503() {
        let response = ObserverError::Unavailable(String::from("down")).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
