use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::auth::ProviderError;
use crate::cache::SessionStoreError;
use crate::result::ApiResponse;
use crate::storage::StorageError;
use crate::utils::error_codes;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "Please sign in to continue".to_string(),
            ),
            AppError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, error_codes::PERMISSION_DENIED, msg)
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR, msg)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, error_codes::UPSTREAM_ERROR, msg),
            AppError::Internal(msg) => {
                // details stay in the log, the client gets a generic message
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ApiResponse::<()>::error(code, error_message))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Not found".into()),
            other => AppError::Internal(format!("database: {other}")),
        }
    }
}

impl From<SessionStoreError> for AppError {
    fn from(e: SessionStoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        tracing::warn!("Identity provider call failed: {}", e);
        AppError::Upstream(e.user_message())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        tracing::warn!("Storage call failed: {}", e);
        AppError::Upstream("Image upload failed, please try again".into())
    }
}

pub type AppResult<T> = Result<T, AppError>;
