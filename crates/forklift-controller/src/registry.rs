//! Declared image view and on-demand export archives
//!
//! The declared set is recomputed from the cluster on every call, so it
//! follows workloads as they come and go. Export archives are cached on disk
//! by name and never invalidated: if the local image behind a name changes,
//! the stale archive keeps being served until it is removed by hand.
//!
//! Exports land in a per-request staging directory under the export dir and
//! are renamed into place once complete, so an archive path only ever holds
//! a whole archive. Concurrent requests for the same image may both export;
//! the last rename wins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use forklift_common::kube_utils::pod_images;
use forklift_common::{Config, Image, ImageSet, PodApi};
use forklift_runtime::{archive_path, ImageRuntime};
use tokio::fs::File;
use tracing::{debug, info, warn};

use crate::LoadError;

/// Prefix of per-export staging directories under the export dir
const STAGING_PREFIX: &str = ".staging-";

/// Result of aggregating images across the active namespaces
#[derive(Debug, Default)]
pub struct ImageCollection {
    /// Deduplicated images in first-seen order
    pub images: ImageSet,
    /// Namespaces whose pod listing failed
    pub skipped: Vec<String>,
}

/// Shared state for the controller's HTTP handlers
pub struct ControllerContext {
    config: Arc<Config>,
    pods: Arc<dyn PodApi>,
    runtime: Arc<dyn ImageRuntime>,
    export_dir: PathBuf,
    next_staging: AtomicU64,
}

impl ControllerContext {
    /// Create a context exporting archives to `export_dir`
    pub fn new(
        config: Arc<Config>,
        pods: Arc<dyn PodApi>,
        runtime: Arc<dyn ImageRuntime>,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            pods,
            runtime,
            export_dir: export_dir.into(),
            next_staging: AtomicU64::new(0),
        }
    }

    /// Collect the images of every container in every pod of the active
    /// namespaces. A namespace that cannot be listed is logged and skipped.
    pub async fn collect_images(&self) -> ImageCollection {
        let mut collection = ImageCollection::default();

        for namespace in &self.config.active_namespaces {
            let pods = match self.pods.list_pods(namespace).await {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Failed to list pods, skipping namespace");
                    collection.skipped.push(namespace.clone());
                    continue;
                }
            };

            for image in pods.iter().flat_map(pod_images) {
                collection.images.insert(Image::new(image));
            }
        }

        debug!(
            images = collection.images.len(),
            skipped = collection.skipped.len(),
            "Collected declared images"
        );
        collection
    }

    /// Images declared by workloads in the active namespaces
    pub async fn get_images(&self) -> ImageSet {
        self.collect_images().await.images
    }

    /// Open the export archive for a declared image, pulling and exporting
    /// it first when needed.
    pub async fn load_image(&self, image: &str) -> Result<File, LoadError> {
        if !self.get_images().await.contains(image) {
            return Err(LoadError::NotFound(image.to_string()));
        }

        let local = self.runtime.list_images().await?;
        if !local.contains(image) {
            info!(image = %image, "Image not present locally, pulling");
            self.runtime.pull_image(image).await?;
        }

        let path = archive_path(&self.export_dir, image);
        if tokio::fs::try_exists(&path).await? {
            debug!(image = %image, path = %path.display(), "Reusing export archive");
        } else {
            info!(image = %image, path = %path.display(), "Exporting image");
            self.export(image, &path).await?;
        }

        Ok(File::open(&path).await?)
    }

    /// Export `image` into a fresh staging directory and rename the archive
    /// to `path`. The staging directory is removed either way.
    async fn export(&self, image: &str, path: &Path) -> Result<(), LoadError> {
        let staging = self.export_dir.join(format!(
            "{}{}-{}",
            STAGING_PREFIX,
            std::process::id(),
            self.next_staging.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::create_dir_all(&staging).await?;

        let result = async {
            self.runtime.export_image(image, &staging).await?;
            tokio::fs::rename(archive_path(&staging, image), path).await?;
            Ok::<(), LoadError>(())
        }
        .await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!(path = %staging.display(), error = %e, "Failed to remove export staging dir");
        }
        result
    }
}
