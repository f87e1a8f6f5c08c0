//! Runtime adapter errors

use std::time::Duration;

use thiserror::Error;

/// Error from a container runtime operation
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The command could not be started
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Command line that failed to start
        command: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// Command line that failed
        command: String,
        /// Exit status as reported by the OS
        status: String,
        /// Trimmed standard error output
        stderr: String,
    },

    /// The command exceeded its timeout and was killed
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        /// Command line that timed out
        command: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Runtime CLI output could not be interpreted
    #[error("unexpected output from `{command}`: {message}")]
    Parse {
        /// Command whose output was rejected
        command: String,
        /// What was wrong with it
        message: String,
    },

    /// Our own container has no running task in containerd
    #[error("no running task for container {0}")]
    TaskNotFound(String),

    /// No adapter exists for this runtime
    #[error("unsupported container runtime {0:?}")]
    Unsupported(String),

    /// A runtime operation failed for a specific image
    #[error("{operation} {image}: {source}")]
    Operation {
        /// Adapter operation (e.g., "export image")
        operation: &'static str,
        /// Image the operation was applied to
        image: String,
        /// What went wrong
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Wrap this error with the adapter operation and image it belongs to
    pub fn during(self, operation: &'static str, image: impl Into<String>) -> Self {
        Self::Operation {
            operation,
            image: image.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_context_prefixes_message() {
        let err = RuntimeError::CommandFailed {
            command: "docker pull nginx:1".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "manifest unknown".to_string(),
        }
        .during("pull image", "nginx:1");

        assert_eq!(
            err.to_string(),
            "pull image nginx:1: `docker pull nginx:1` failed (exit status: 1): manifest unknown"
        );
    }

    #[test]
    fn timeout_reports_duration() {
        let err = RuntimeError::Timeout {
            command: "docker save".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "`docker save` timed out after 30s");
    }
}
