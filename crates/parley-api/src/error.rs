use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Operation-surface errors. Store failures are logged with their cause
/// and surfaced as the generic `OperationFailed`; the one exception to
/// this taxonomy is `createUsername`, which answers with a result object
/// instead of raising at all.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not Authorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("operation failed")]
    OperationFailed,
}

impl ApiError {
    pub fn from_store(err: anyhow::Error) -> Self {
        error!("store operation failed: {err:#}");
        Self::OperationFailed
    }

    pub fn from_join(err: tokio::task::JoinError) -> Self {
        error!("blocking task join error: {err}");
        Self::OperationFailed
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::OperationFailed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
