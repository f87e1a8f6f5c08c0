//! Forklift node agent
//!
//! Runs on every node and periodically imports the images the controller
//! declares but the node's runtime lacks, fetching them from the controller
//! instead of the origin registry.

#![deny(missing_docs)]

pub mod client;
pub mod error;
pub mod reconciler;

pub use client::{ControllerClient, ImageSource};
pub use error::AgentError;
pub use reconciler::{Reconciler, TickReport};

use std::future::Future;
use std::time::Duration;

use tracing::info;

/// Default delay before the agent first contacts the cluster API
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Default interval between ticks
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Wait `delay`, then run `startup`.
///
/// The delay lets the cluster API and the node runtime become reachable;
/// `startup` is not polled before it elapses.
pub async fn after_startup_delay<F: Future>(delay: Duration, startup: F) -> F::Output {
    if !delay.is_zero() {
        info!(delay_secs = delay.as_secs(), "Waiting before startup");
        tokio::time::sleep(delay).await;
    }
    startup.await
}
