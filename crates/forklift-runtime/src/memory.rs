//! In-memory [`ImageRuntime`] for tests
//!
//! Archives are real files containing a one-line manifest, so export and
//! load exercise the same filesystem paths as the real adapters.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use forklift_common::{Image, ImageSet};

use crate::{archive_path, ImageRuntime, RuntimeError};

const MANIFEST_PREFIX: &str = "forklift-test-archive:";

/// Operation recorded by [`InMemoryRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// `list_images`
    List,
    /// `pull_image(image)`
    Pull(String),
    /// `export_image(image, _)`
    Export(String),
    /// `load_image(image, _)`
    Load(String),
}

#[derive(Default)]
struct State {
    local: ImageSet,
    registry: HashSet<String>,
    failing: HashSet<String>,
    calls: Vec<RuntimeCall>,
}

/// Runtime whose storage is a set of names
#[derive(Default)]
pub struct InMemoryRuntime {
    state: Mutex<State>,
}

impl InMemoryRuntime {
    /// Empty runtime with an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add images to local storage
    pub fn with_local<I, S>(self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.lock();
            for image in images {
                state.local.insert(Image::new(image));
            }
        }
        self
    }

    /// Make images available for pulling
    pub fn with_registry<I, S>(self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .registry
            .extend(images.into_iter().map(Into::<String>::into));
        self
    }

    /// Make every pull, export, and load of `image` fail
    pub fn failing(self, image: impl Into<String>) -> Self {
        self.lock().failing.insert(image.into());
        self
    }

    /// Names currently in local storage
    pub fn local_names(&self) -> Vec<String> {
        self.lock().local.names()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Bytes an export of `image` produces
    pub fn archive_bytes(image: &str) -> Vec<u8> {
        format!("{}{}\n", MANIFEST_PREFIX, image).into_bytes()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: RuntimeCall, image: &str) -> Result<(), RuntimeError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing.contains(image) {
            return Err(failure(image, "injected failure"));
        }
        Ok(())
    }
}

fn failure(image: &str, message: &str) -> RuntimeError {
    RuntimeError::CommandFailed {
        command: format!("in-memory {}", image),
        status: "exit status: 1".to_string(),
        stderr: message.to_string(),
    }
}

#[async_trait]
impl ImageRuntime for InMemoryRuntime {
    async fn list_images(&self) -> Result<ImageSet, RuntimeError> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::List);
        Ok(state.local.clone())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Pull(image.to_string()), image)?;
        let mut state = self.lock();
        if !state.registry.contains(image) {
            return Err(failure(image, "manifest unknown"));
        }
        state.local.insert(Image::new(image));
        Ok(())
    }

    async fn export_image(&self, image: &str, dest_dir: &Path) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Export(image.to_string()), image)?;
        if !self.lock().local.contains(image) {
            return Err(failure(image, "no such image"));
        }

        tokio::fs::write(archive_path(dest_dir, image), Self::archive_bytes(image))
            .await
            .map_err(|e| failure(image, &e.to_string()))
    }

    async fn load_image(&self, image: &str, source: &Path) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Load(image.to_string()), image)?;
        let content = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| failure(image, &e.to_string()))?;

        // The archive names the image it carries, as docker archives do
        let name = content
            .trim_end()
            .strip_prefix(MANIFEST_PREFIX)
            .ok_or_else(|| failure(image, "not an image archive"))?;
        self.lock().local.insert(Image::new(name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn export_then_load_moves_image() {
        let dir = tempfile::tempdir().unwrap();
        let source = InMemoryRuntime::new().with_local(["app:v1"]);
        let target = InMemoryRuntime::new();

        source.export_image("app:v1", dir.path()).await.unwrap();
        target
            .load_image("app:v1", &archive_path(dir.path(), "app:v1"))
            .await
            .unwrap();
        // Loading twice is fine
        target
            .load_image("app:v1", &archive_path(dir.path(), "app:v1"))
            .await
            .unwrap();

        assert_eq!(target.local_names(), vec!["app:v1"]);
    }

    #[tokio::test]
    async fn pull_requires_registry_entry() {
        let runtime = InMemoryRuntime::new().with_registry(["app:v1"]);
        runtime.pull_image("app:v1").await.unwrap();
        assert!(runtime.pull_image("app:v2").await.is_err());
        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::Pull("app:v1".to_string()),
                RuntimeCall::Pull("app:v2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn failing_image_fails_every_operation() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = InMemoryRuntime::new()
            .with_local(["bad:1"])
            .failing("bad:1");
        assert!(runtime.export_image("bad:1", dir.path()).await.is_err());
        assert!(runtime.pull_image("bad:1").await.is_err());
    }
}
