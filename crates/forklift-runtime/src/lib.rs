//! Container runtime adapters for Forklift
//!
//! [`ImageRuntime`] is the uniform list/pull/export/load surface the
//! controller and agent are written against. One implementation is selected
//! at startup from the process's [`RuntimeIdentity`] and callers never branch
//! on the runtime kind again.

#![deny(missing_docs)]

pub mod containerd;
pub mod docker;
pub mod error;
pub mod exec;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod reference;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forklift_common::{archive_file_name, ImageSet, RuntimeIdentity, RuntimeKind};

pub use containerd::ContainerdRuntime;
pub use docker::DockerRuntime;
pub use error::RuntimeError;
pub use exec::{HostExec, NsenterExec};

/// Host-side directory used for intermediate archives
pub const DEFAULT_HOST_SCRATCH_DIR: &str = "/tmp";

/// containerd namespace managed by kubelet
pub const DEFAULT_CONTAINERD_NAMESPACE: &str = "k8s.io";

/// Default timeout for a single runtime command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Image operations against the node's container runtime.
///
/// Every call acts on the host runtime's state. A failed underlying command
/// fails the whole call.
#[async_trait]
pub trait ImageRuntime: Send + Sync {
    /// Enumerate images in local runtime storage. Malformed entries are skipped.
    async fn list_images(&self) -> Result<ImageSet, RuntimeError>;

    /// Fetch `image` from its origin registry.
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Serialize `image` to [`archive_path`]`(dest_dir, image)` in this
    /// process's filesystem.
    async fn export_image(&self, image: &str, dest_dir: &Path) -> Result<(), RuntimeError>;

    /// Import the archive at `source` (in this process's filesystem).
    /// Importing an image that is already present is not an error.
    async fn load_image(&self, image: &str, source: &Path) -> Result<(), RuntimeError>;
}

/// Deterministic location of the export archive for `image` under `dir`
pub fn archive_path(dir: &Path, image: &str) -> PathBuf {
    dir.join(archive_file_name(image))
}

/// Tunables shared by the runtime adapters
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Host-side directory for intermediate archives (docker)
    pub host_scratch_dir: PathBuf,
    /// containerd namespace holding kubelet's images
    pub containerd_namespace: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            host_scratch_dir: PathBuf::from(DEFAULT_HOST_SCRATCH_DIR),
            containerd_namespace: DEFAULT_CONTAINERD_NAMESPACE.to_string(),
        }
    }
}

/// Select the adapter for the runtime backing this process
pub fn runtime_for(
    identity: &RuntimeIdentity,
    exec: Arc<dyn HostExec>,
    options: &RuntimeOptions,
) -> Result<Arc<dyn ImageRuntime>, RuntimeError> {
    match identity.kind {
        RuntimeKind::Docker => Ok(Arc::new(DockerRuntime::new(
            exec,
            identity.container_id.clone(),
            options.host_scratch_dir.clone(),
        ))),
        RuntimeKind::Containerd => Ok(Arc::new(ContainerdRuntime::new(
            exec,
            identity.container_id.clone(),
            options.containerd_namespace.clone(),
        ))),
        RuntimeKind::Unknown => Err(RuntimeError::Unsupported(identity.kind.to_string())),
    }
}
