//! Runtime identity resolution
//!
//! Forklift drives the host's container runtime from inside a pod, so at
//! startup it needs two facts about itself: which runtime runs its container
//! (docker or containerd) and the host-level ID of that container. Both come
//! from the pod's own status, where kubelet records `containerID` as
//! `<runtime>://<id>`.

use std::fmt;
use std::path::PathBuf;

use k8s_openapi::api::core::v1::Pod;
use tracing::info;

use crate::kube_utils::PodApi;
use crate::{Error, Result, SERVICE_ACCOUNT_NAMESPACE_PATH};

/// Container runtime backing the current pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Docker engine (`docker://`)
    Docker,
    /// containerd (`containerd://`)
    Containerd,
    /// Any other runtime
    Unknown,
}

impl RuntimeKind {
    /// Map a container ID scheme to a runtime kind
    pub fn from_scheme(scheme: &str) -> Self {
        match scheme {
            "docker" => Self::Docker,
            "containerd" => Self::Containerd,
            _ => Self::Unknown,
        }
    }

    /// Scheme string for this runtime
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Containerd => "containerd",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime kind and host-level container ID of the current process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeIdentity {
    /// Runtime that runs this container
    pub kind: RuntimeKind,
    /// Container ID as known to the host runtime
    pub container_id: String,
}

impl RuntimeIdentity {
    /// Parse a kubelet container ID of the form `scheme://host-id`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (scheme, id) = raw
            .split_once("://")
            .ok_or_else(|| Error::identity(format!("malformed container id {:?}", raw)))?;
        if id.is_empty() {
            return Err(Error::identity(format!("empty host id in {:?}", raw)));
        }

        match RuntimeKind::from_scheme(scheme) {
            RuntimeKind::Unknown => Err(Error::UnsupportedRuntime(scheme.to_string())),
            kind => Ok(Self {
                kind,
                container_id: id.to_string(),
            }),
        }
    }
}

/// Trait for reading the pod's own coordinates from its environment
#[cfg_attr(test, mockall::automock)]
pub trait PodEnv: Send + Sync {
    /// Namespace the pod runs in
    fn namespace(&self) -> Option<String>;

    /// Name of the pod
    fn pod_name(&self) -> Option<String>;
}

/// Default implementation reading the service account mount and environment
#[derive(Clone)]
pub struct OsPodEnv {
    namespace_file: PathBuf,
}

impl Default for OsPodEnv {
    fn default() -> Self {
        Self {
            namespace_file: PathBuf::from(SERVICE_ACCOUNT_NAMESPACE_PATH),
        }
    }
}

impl PodEnv for OsPodEnv {
    fn namespace(&self) -> Option<String> {
        std::fs::read_to_string(&self.namespace_file)
            .ok()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
    }

    fn pod_name(&self) -> Option<String> {
        std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .ok()
            .filter(|name| !name.is_empty())
    }
}

/// Find the container ID of `container_name` in the pod's status.
///
/// Scans statuses last-to-first and skips entries without an ID, so a
/// restarted container resolves to its newest registered instance.
pub fn find_container_id<'a>(pod: &'a Pod, container_name: &str) -> Option<&'a str> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .rev()
        .filter(|s| s.name == container_name)
        .filter_map(|s| s.container_id.as_deref())
        .find(|id| !id.is_empty())
}

/// Resolve the runtime identity of `container_name` in the current pod.
pub async fn resolve_identity(
    pods: &dyn PodApi,
    env: &dyn PodEnv,
    container_name: &str,
) -> Result<RuntimeIdentity> {
    let namespace = env
        .namespace()
        .ok_or_else(|| Error::identity("current namespace is unknown"))?;
    let pod_name = env
        .pod_name()
        .ok_or_else(|| Error::identity("current pod name is unknown"))?;

    let pod = pods.get_pod(&namespace, &pod_name).await?;
    let raw = find_container_id(&pod, container_name).ok_or_else(|| {
        Error::identity(format!(
            "no container id for container {:?} in pod {}/{}",
            container_name, namespace, pod_name
        ))
    })?;

    let identity = RuntimeIdentity::parse(raw)?;
    info!(
        runtime = %identity.kind,
        container_id = %identity.container_id,
        pod = %pod_name,
        namespace = %namespace,
        "Resolved runtime identity"
    );
    Ok(identity)
}
