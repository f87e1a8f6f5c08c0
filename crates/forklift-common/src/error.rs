//! Error types shared by the controller and the agent
//!
//! Every variant here is a startup-time failure: a bad config file, an
//! unreachable cluster API, or a pod whose runtime cannot be identified.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Forklift startup and cluster operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Namespace config file missing or malformed
    #[error("config error for {}: {message}", path.display())]
    Config {
        /// Path of the config file
        path: PathBuf,
        /// Description of what's wrong
        message: String,
    },

    /// The current pod or its container could not be identified
    #[error("runtime identity error: {0}")]
    Identity(String),

    /// The container ID scheme names a runtime we have no adapter for
    #[error("unsupported container runtime {0:?}")]
    UnsupportedRuntime(String),

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "pods", "telemetry")
        context: String,
    },
}

impl Error {
    /// Create a config error for the given file
    pub fn config(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an identity error with the given message
    pub fn identity(msg: impl Into<String>) -> Self {
        Self::Identity(msg.into())
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_file() {
        let err = Error::config("/etc/forklift/forklift.yaml", "missing field");
        assert_eq!(
            err.to_string(),
            "config error for /etc/forklift/forklift.yaml: missing field"
        );
    }

    #[test]
    fn unsupported_runtime_quotes_scheme() {
        let err = Error::UnsupportedRuntime("cri-o".to_string());
        assert_eq!(err.to_string(), "unsupported container runtime \"cri-o\"");
    }

    #[test]
    fn internal_error_includes_context() {
        let err = Error::internal("pods", "connection reset");
        assert_eq!(err.to_string(), "internal error [pods]: connection reset");
    }
}
