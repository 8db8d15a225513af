//! Top-level error taxonomy (§7).
//!
//! Each subsystem keeps its own `thiserror` enum (`RpcPoolError`,
//! `StoreError`, `VerificationError`, ...); this one is the root crate's own
//! glue, used by `main.rs` and the HTTP layer to turn any of those into a
//! response.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Store(#[from] studio_indexer_store::StoreError),

    #[error(transparent)]
    Rpc(#[from] crate::rpc::RpcPoolError),

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for IndexerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            IndexerError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            IndexerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            IndexerError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            IndexerError::Config(_) | IndexerError::Store(_) | IndexerError::Rpc(_) => {
                tracing::error!(error = %self, "request failed with an internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
