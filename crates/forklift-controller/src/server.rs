//! Controller HTTP surface
//!
//! - `GET /` - JSON array of declared image names
//! - `GET /load?image=NAME` - export archive of a declared image
//! - `GET /healthz` - liveness

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use forklift_common::LOAD_PATH;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::{ControllerContext, LoadError};

/// Content type of image archives
pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-tar";

#[derive(Debug, Deserialize)]
struct LoadQuery {
    image: Option<String>,
}

/// Build the controller router
pub fn router(ctx: Arc<ControllerContext>) -> Router {
    Router::new()
        .route("/", get(list_images))
        .route(LOAD_PATH, get(load_image))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(ctx)
}

async fn list_images(State(ctx): State<Arc<ControllerContext>>) -> Json<Vec<String>> {
    Json(ctx.get_images().await.names())
}

async fn load_image(
    State(ctx): State<Arc<ControllerContext>>,
    Query(query): Query<LoadQuery>,
) -> Result<Response, LoadError> {
    let image = query
        .image
        .map(|image| image.trim().to_string())
        .filter(|image| !image.is_empty())
        .ok_or(LoadError::MissingImage)?;

    let file = ctx.load_image(&image).await.map_err(|e| {
        match &e {
            LoadError::NotFound(_) | LoadError::MissingImage => {
                warn!(image = %image, error = %e, "Rejected archive request")
            }
            _ => error!(image = %image, error = %e, "Failed to serve image archive"),
        }
        e
    })?;
    let size = file.metadata().await?.len();
    info!(image = %image, bytes = size, "Serving image archive");

    // Dropping the stream (client disconnect) closes the file
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE.to_string()),
            (header::CONTENT_LENGTH, size.to_string()),
        ],
        body,
    )
        .into_response())
}

/// Parse a listen address, accepting the `:port` shorthand for all interfaces
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    match raw.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port).parse(),
        None => raw.parse(),
    }
}

/// Serve the router on `addr` until `shutdown` resolves
pub async fn serve(
    ctx: Arc<ControllerContext>,
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Controller listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
}
