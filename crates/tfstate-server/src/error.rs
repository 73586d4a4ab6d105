//! Error types for the state server.

use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tfstate_core::ProtocolError;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Response carrying only the standard status phrase.
fn status_text(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Unauthorized => return status_text(StatusCode::UNAUTHORIZED),
            ApiError::InvalidQuery(_) => return status_text(StatusCode::BAD_REQUEST),
            ApiError::MethodNotAllowed(_) => return status_text(StatusCode::METHOD_NOT_ALLOWED),
            ApiError::Protocol(err) => err,
        };

        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
        match err {
            // The holder's lock record, untouched
            ProtocolError::Locked(record) | ProtocolError::Conflict(record) => {
                (status, [(header::CONTENT_TYPE, "application/json")], record).into_response()
            }
            ProtocolError::Backend { message, .. } => (status, message).into_response(),
            _ => status_text(status),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
