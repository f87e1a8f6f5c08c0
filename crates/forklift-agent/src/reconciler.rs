//! Node reconcile loop
//!
//! Each tick diffs the runtime's local images against the controller's
//! declared set and transfers whatever is missing, one image at a time. A
//! failed image is logged and left for the next tick; there is no other
//! retry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use forklift_common::{diff, Image, ImageSet};
use forklift_runtime::{archive_path, ImageRuntime};
use tracing::{debug, info, warn};

use crate::{AgentError, ImageSource};

/// Outcome of one reconcile tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Declared images absent locally when the tick started, in declared order
    pub missing: Vec<String>,
    /// Images transferred and imported during the tick
    pub loaded: Vec<String>,
    /// Images whose transfer failed
    pub failed: Vec<String>,
}

/// Drives the local runtime towards the controller's declared image set
pub struct Reconciler {
    runtime: Arc<dyn ImageRuntime>,
    source: Arc<dyn ImageSource>,
    download_dir: PathBuf,
}

impl Reconciler {
    /// Create a reconciler downloading archives into `download_dir`
    pub fn new(
        runtime: Arc<dyn ImageRuntime>,
        source: Arc<dyn ImageSource>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            source,
            download_dir: download_dir.into(),
        }
    }

    /// Run one diff-and-transfer pass.
    ///
    /// Fails only if the local or declared image list cannot be fetched.
    pub async fn tick(&self) -> Result<TickReport, AgentError> {
        let local = self.runtime.list_images().await?;
        let declared: ImageSet = self
            .source
            .declared_images()
            .await?
            .into_iter()
            .map(Image::new)
            .collect();

        let missing = diff(&declared, &local);
        let mut report = TickReport {
            missing: missing.names(),
            ..Default::default()
        };
        if missing.is_empty() {
            debug!(declared = declared.len(), "All declared images present");
            return Ok(report);
        }

        info!(count = missing.len(), "Transferring missing images");
        for image in &missing {
            match self.transfer(&image.name).await {
                Ok(()) => {
                    info!(image = %image.name, "Imported image");
                    report.loaded.push(image.name.clone());
                }
                Err(e) => {
                    warn!(image = %image.name, error = %e, "Failed to transfer image");
                    report.failed.push(image.name.clone());
                }
            }
        }
        Ok(report)
    }

    async fn transfer(&self, image: &str) -> Result<(), AgentError> {
        let path = archive_path(&self.download_dir, image);
        self.source.download(image, &path).await?;
        self.runtime.load_image(image, &path).await?;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove downloaded archive");
        }
        Ok(())
    }

    /// Tick now and then every `interval`.
    ///
    /// The interval is measured from the end of one tick to the start of the
    /// next, so ticks never overlap.
    pub async fn run(&self, interval: Duration) {
        loop {
            match self.tick().await {
                Ok(report) => info!(
                    missing = report.missing.len(),
                    loaded = report.loaded.len(),
                    failed = report.failed.len(),
                    "Reconcile tick complete"
                ),
                Err(e) => warn!(error = %e, "Reconcile tick failed, retrying next interval"),
            }
            tokio::time::sleep(interval).await;
        }
    }
}
