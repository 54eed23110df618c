//! Error families for the storage layer and the request engine.

use http::StatusCode;
use serde_json::json;

use crate::responder::Responder;
use crate::types::Response;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage codec failure: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("storage is closed")]
    Closed,
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Backend(Box::new(err))
    }
}

/// Errors surfaced from the request engine. Anything reaching the caller
/// before bytes have started streaming back converts into one of these;
/// anything after that point is logged only, per §7's propagation rule.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no matching mock found for {method} {path}")]
    ReplayMiss { method: String, path: String },
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("startup failure: {0}")]
    Fatal(String),
}

impl Responder for EngineError {
    fn into_response(self) -> Response {
        match self {
            EngineError::ReplayMiss { method, path } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "Not Found",
                    "message": "No matching mock found for this request",
                    "request": {"method": method, "path": path},
                }),
            )
                .into_response(),
            EngineError::Validation(m) => {
                (StatusCode::BAD_REQUEST, json!({"error": "Bad Request", "message": m})).into_response()
            }
            EngineError::NotFound(m) => {
                (StatusCode::NOT_FOUND, json!({"error": "Not Found", "message": m})).into_response()
            }
            EngineError::UpstreamUnreachable(m) => {
                (StatusCode::BAD_GATEWAY, json!({"error": "Bad Gateway", "message": m})).into_response()
            }
            EngineError::UpstreamTimeout(m) => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({"error": "Gateway Timeout", "message": m}),
            )
                .into_response(),
            EngineError::Storage(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Internal Server Error", "message": e.to_string()}),
            )
                .into_response(),
            EngineError::Fatal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Internal Server Error", "message": m}),
            )
                .into_response(),
        }
    }
}
