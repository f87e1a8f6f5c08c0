//! Common types for Forklift: image sets, config, runtime identity, and utilities
//!
//! Shared by the controller (which serves images to nodes) and the agent
//! (which runs on every node and pulls missing images from the controller).

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod identity;
pub mod image;
pub mod kube_utils;
pub mod signal;
pub mod telemetry;

pub use config::Config;
pub use error::Error;
pub use identity::{resolve_identity, OsPodEnv, PodEnv, RuntimeIdentity, RuntimeKind};
pub use image::{archive_file_name, diff, Image, ImageSet};
pub use kube_utils::{KubePodApi, PodApi};
pub use signal::shutdown_signal;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default location of the controller's namespace config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/forklift/forklift.yaml";

/// Service account file holding the namespace this pod runs in
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Container name of the controller inside its pod
pub const DEFAULT_CONTROLLER_CONTAINER: &str = "forklift-controller";

/// Container name of the node agent inside its DaemonSet pod
pub const DEFAULT_AGENT_CONTAINER: &str = "forklift-agent";

/// Default in-cluster address of the controller Service
pub const DEFAULT_CONTROLLER_ADDR: &str = "http://forklift-controller";

/// Controller path serving image archives
pub const LOAD_PATH: &str = "/load";

/// Query parameter naming the image requested from [`LOAD_PATH`]
pub const IMAGE_QUERY_PARAM: &str = "image";
