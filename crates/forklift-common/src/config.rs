//! Controller namespace configuration
//!
//! ```yaml
//! active-namespaces:
//!   - default
//!   - apps
//! ```
//!
//! Loaded once at startup. A missing or malformed file stops the controller.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Namespaces whose workloads declare the image set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Namespaces scanned for pod images, in scan order
    #[serde(rename = "active-namespaces")]
    pub active_namespaces: Vec<String>,
}

impl Config {
    /// Parse config from YAML content. `origin` is only used in error messages.
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::config(origin, e.to_string()))
    }

    /// Read and parse the config file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(path, format!("failed to read: {}", e)))?;
        let config = Self::from_yaml(&content, path)?;

        tracing::info!(
            path = %path.display(),
            namespaces = ?config.active_namespaces,
            "Loaded config"
        );
        Ok(config)
    }
}
