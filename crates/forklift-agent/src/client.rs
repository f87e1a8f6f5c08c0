//! HTTP client for the controller

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use forklift_common::{IMAGE_QUERY_PARAM, LOAD_PATH};
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::AgentError;

/// Connect timeout for controller requests
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the agent gets the declared image set and image archives from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Names of all declared images, in the controller's order
    async fn declared_images(&self) -> Result<Vec<String>, AgentError>;

    /// Download the archive for `image` to `dest`, replacing any existing file
    async fn download(&self, image: &str, dest: &Path) -> Result<(), AgentError>;
}

/// [`ImageSource`] talking to the controller's HTTP API
#[derive(Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControllerClient {
    /// Create a client for the controller at `base_url` (e.g. `http://forklift-controller`)
    pub fn new(base_url: &str) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ImageSource for ControllerClient {
    async fn declared_images(&self) -> Result<Vec<String>, AgentError> {
        let url = format!("{}/", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::Status {
                status: response.status(),
                url,
            });
        }
        Ok(response.json().await?)
    }

    async fn download(&self, image: &str, dest: &Path) -> Result<(), AgentError> {
        let url = format!("{}{}", self.base_url, LOAD_PATH);
        let mut response = self
            .http
            .get(&url)
            .query(&[(IMAGE_QUERY_PARAM, image)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(AgentError::NotDeclared(image.to_string())),
            status => return Err(AgentError::Status { status, url }),
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(image = %image, bytes = written, path = %dest.display(), "Downloaded archive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = ControllerClient::new("http://forklift-controller/").unwrap();
        assert_eq!(client.base_url(), "http://forklift-controller");

        let client = ControllerClient::new("http://10.0.0.1:8080").unwrap();
        assert_eq!(client.base_url(), "http://10.0.0.1:8080");
    }

    #[tokio::test]
    async fn unreachable_controller_is_http_error() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let client = ControllerClient::new(&format!("http://{}", addr)).unwrap();
        let err = client.declared_images().await.unwrap_err();
        assert!(matches!(err, AgentError::Http(_)));
    }
}
