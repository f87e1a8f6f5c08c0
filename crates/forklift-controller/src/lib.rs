//! Forklift controller
//!
//! Aggregates the images used by workloads in the configured namespaces and
//! serves export archives of them to node agents over HTTP.

#![deny(missing_docs)]

pub mod error;
pub mod registry;
pub mod server;

pub use error::LoadError;
pub use registry::{ControllerContext, ImageCollection};
pub use server::{parse_listen_addr, router, serve};
