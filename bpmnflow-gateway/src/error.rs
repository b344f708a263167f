use axum::{response::IntoResponse, Json};
use http::StatusCode;
use serde_json::json;

use bpmnflow_engine::{ConfigError, EngineError};
use bpmnflow_model::ErrorQueue;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    /// Definition invariants violated; carries the whole parse error queue.
    #[error("{0}")]
    Parse(ErrorQueue),

    /// Anything the engine raised while executing an operation.
    #[error("{0}")]
    Execution(String),
}

impl From<ErrorQueue> for AppError {
    fn from(errors: ErrorQueue) -> Self {
        AppError::Parse(errors)
    }
}

impl From<ConfigError> for AppError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::UnknownDefinition(_) => AppError::NotFound,
            other => AppError::Execution(other.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(error: EngineError) -> Self {
        AppError::Execution(error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"code": "NotFound", "message": "not found"}})),
            )
                .into_response(),
            AppError::Parse(errors) => {
                let details: Vec<_> = errors
                    .issues
                    .iter()
                    .map(|issue| {
                        json!({
                            "code": issue.code.to_string(),
                            "element": issue.element,
                            "message": issue.message,
                        })
                    })
                    .collect();
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": {
                            "code": "BPMNParseError",
                            "message": errors.to_string(),
                            "errors": details,
                        }
                    })),
                )
                    .into_response()
            }
            AppError::Execution(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": {"code": "BPMNExecutionError", "message": message}
                })),
            )
                .into_response(),
        }
    }
}
