//! Archive request errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forklift_runtime::RuntimeError;
use thiserror::Error;

/// Errors serving an image archive
#[derive(Debug, Error)]
pub enum LoadError {
    /// The request did not name an image
    #[error("missing required query parameter \"image\"")]
    MissingImage,

    /// The image is not used by any workload in an active namespace
    #[error("image {0} is not declared by any active workload")]
    NotFound(String),

    /// Pull, export, or listing failed
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The export archive could not be opened or read
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for LoadError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            LoadError::MissingImage => (StatusCode::BAD_REQUEST, self.to_string()),
            LoadError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            LoadError::Runtime(_) | LoadError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}
