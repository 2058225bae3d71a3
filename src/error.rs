use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::ApiError;

/// Error kinds the HTTP surface and the Orchestrator branch on directly.
///
/// Everything else in the core (normalizer, aggregator, detector internals)
/// propagates plain `anyhow::Error` the way the rest of the stack does;
/// this type exists only at the boundaries that need to tell kinds apart.
#[derive(Debug, thiserror::Error)]
pub enum CalculatorError {
    #[error("upstream Parser error: {0}")]
    Upstream(String),

    #[error("Parser URL not configured")]
    ParserNotConfigured,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("notification dispatch error: {0}")]
    Dispatch(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for CalculatorError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            CalculatorError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            CalculatorError::ParserNotConfigured => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            CalculatorError::Storage(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            CalculatorError::Dispatch(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            CalculatorError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            CalculatorError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = ApiError {
            error: self.to_string(),
            details: Some(details),
        };

        (status, Json(body)).into_response()
    }
}
