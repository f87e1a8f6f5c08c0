//! Agent error types

use forklift_runtime::RuntimeError;
use thiserror::Error;

/// Errors during a reconcile tick or a single image transfer
#[derive(Debug, Error)]
pub enum AgentError {
    /// The controller could not be reached or the response was unreadable
    #[error("controller request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The controller answered with an unexpected status
    #[error("controller returned {status} for {url}")]
    Status {
        /// HTTP status returned
        status: reqwest::StatusCode,
        /// Request URL
        url: String,
    },

    /// The controller no longer declares the image
    #[error("image {0} is not declared by the controller")]
    NotDeclared(String),

    /// Writing or removing the downloaded archive failed
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),

    /// The local runtime failed
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
