use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, expired or revoked token.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Capability denied. Deliberately carries no rule identity.
    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    /// First failing field of request validation.
    #[error("{0}")]
    Validation(String),

    /// Login failure. Single message regardless of which check failed.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "unauthenticated",
                "invalid or missing token".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "forbidden",
                "forbidden".to_string(),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                format!("{} not found", what),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "invalid_request_error",
                "conflict",
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                msg.clone(),
            ),
            AppError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                "authentication_error",
                "invalid_credentials",
                "invalid username or password".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Cache(e) => {
                tracing::error!("Cache error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

/// Maps `RowNotFound` onto the domain's 404 instead of a 500.
/// Every other sqlx failure stays an internal error.
pub fn row_or_not_found(err: sqlx::Error, what: &'static str) -> AppError {
    match err {
        sqlx::Error::RowNotFound => AppError::NotFound(what),
        other => AppError::Database(other),
    }
}
