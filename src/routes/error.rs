use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::config::generation::ConfigError;
use crate::services::prompt::PromptError;
use crate::services::queue::QueueError;
use crate::services::wildcards::WildcardError;

/// Error type for HTTP handlers, rendered as `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Wildcard(#[from] WildcardError),

    #[error("Validation failed: {0}")]
    Validation(#[from] garde::Report),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Queue(e) => match e {
                QueueError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                QueueError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
                QueueError::InvalidJob(_) => (StatusCode::BAD_REQUEST, "INVALID_JOB"),
                QueueError::Locked(_) | QueueError::Persist(_) => internal(&self),
            },
            ApiError::Config(e) => match e {
                ConfigError::NotFound(_) => (StatusCode::NOT_FOUND, "CONFIG_NOT_FOUND"),
                ConfigError::InvalidName(_) => (StatusCode::BAD_REQUEST, "INVALID_CONFIG_NAME"),
                ConfigError::Malformed { .. } | ConfigError::Invalid { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_CONFIG")
                }
                ConfigError::Io(_) => internal(&self),
            },
            ApiError::Prompt(PromptError::InvalidCount) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            ApiError::Prompt(PromptError::Wildcard(e)) | ApiError::Wildcard(e) => {
                classify_wildcard_error(e, &self)
            }
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::JobNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_wildcard_error(err: &WildcardError, outer: &ApiError) -> (StatusCode, &'static str) {
    match err {
        WildcardError::NotFound(_) => (StatusCode::UNPROCESSABLE_ENTITY, "WILDCARD_NOT_FOUND"),
        WildcardError::Empty(_) => (StatusCode::UNPROCESSABLE_ENTITY, "WILDCARD_EMPTY"),
        WildcardError::InvalidName(_) => (StatusCode::BAD_REQUEST, "INVALID_WILDCARD_NAME"),
        WildcardError::Io(_) | WildcardError::Persist(_) => internal(outer),
    }
}

fn internal(err: &ApiError) -> (StatusCode, &'static str) {
    tracing::error!(error = %err, "Internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
}
