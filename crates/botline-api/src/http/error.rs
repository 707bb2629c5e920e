//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use botline_types::error::SessionError;

use crate::http::response::Envelope;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Session core errors.
    Session(SessionError),
    /// Validation error.
    Validation(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

impl AppError {
    /// Status code, machine code and message for this error.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Session(e @ SessionError::TenantNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "TENANT_NOT_FOUND", e.to_string())
            }
            AppError::Session(e @ SessionError::NotConnected { .. }) => {
                (StatusCode::CONFLICT, "NOT_CONNECTED", e.to_string())
            }
            AppError::Session(e @ SessionError::AuthStore { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_STORE_ERROR", e.to_string())
            }
            AppError::Session(e @ SessionError::Transport { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TRANSPORT_ERROR", e.to_string())
            }
            AppError::Session(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SESSION_ERROR", e.to_string())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Envelope::failure(code, message)).into_response()
    }
}
