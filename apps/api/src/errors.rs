use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;
use crate::forms::validation::FieldError;
use crate::models::RowError;
use crate::session::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    /// Already mapped to user-facing wording.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Malformed row: {0}")]
    Row(#[from] RowError),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<Vec<FieldError>> for AppError {
    fn from(errors: Vec<FieldError>) -> Self {
        AppError::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut fields = None;
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(errors) => {
                fields = Some(errors.clone());
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "VALIDATION_ERROR",
                    errors
                        .first()
                        .map(|e| e.message.clone())
                        .unwrap_or_else(|| "Invalid input".to_string()),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Please sign in to continue".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Access denied".to_string(),
            ),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR", msg.clone()),
            AppError::Backend(BackendError::PrivilegedUnavailable) => {
                tracing::error!("Privileged call attempted without a service-role key");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "PRIVILEGED_UNAVAILABLE",
                    "This action is not available on this deployment".to_string(),
                )
            }
            AppError::Backend(e) => {
                tracing::error!("Backend error: {e}");
                let status = match e.status() {
                    Some(404) => StatusCode::NOT_FOUND,
                    Some(409) => StatusCode::CONFLICT,
                    Some(401) => StatusCode::UNAUTHORIZED,
                    Some(403) => StatusCode::FORBIDDEN,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    "BACKEND_ERROR",
                    "The service could not complete the request".to_string(),
                )
            }
            AppError::Row(e) => {
                tracing::error!("Row rejected: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "MALFORMED_ROW",
                    "The service returned data in an unexpected shape".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Local store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "Local storage is unavailable".to_string(),
                )
            }
            AppError::Timeout(limit) => {
                tracing::warn!("Request timed out after {limit:?}");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "TIMEOUT",
                    "The service took too long to respond".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(fields) = fields {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
