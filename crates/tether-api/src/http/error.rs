//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tether_types::error::{QueueError, RemoteError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// The `{ip}` path segment is not in `server.allowed_ips`.
    IpNotAllowed(String),
    /// Remote chat server call failed.
    Remote(RemoteError),
    Queue(QueueError),
    NotFound(String),
    Validation(String),
    Internal(String),
}

impl From<RemoteError> for AppError {
    fn from(e: RemoteError) -> Self {
        AppError::Remote(e)
    }
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        AppError::Queue(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::IpNotAllowed(ip) => (
                StatusCode::FORBIDDEN,
                "IP_NOT_ALLOWED",
                format!("Host '{ip}' is not in the allow-list"),
            ),
            AppError::Remote(RemoteError::Status { status: 404, .. }) => (
                StatusCode::NOT_FOUND,
                "REMOTE_NOT_FOUND",
                "Remote session not found".to_string(),
            ),
            AppError::Remote(e) => (StatusCode::BAD_GATEWAY, "REMOTE_ERROR", e.to_string()),
            AppError::Queue(e @ QueueError::NoFailedJob(_)) => {
                (StatusCode::NOT_FOUND, "NO_FAILED_JOB", e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::warn!(code, %message, "request failed");
        }
        (status, Json(ApiResponse::failure(code, message))).into_response()
    }
}
