//! HTTP client for archive mirrors
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Listing requests with retry and single-attempt archive streams

use url::Url;

use crate::errors::{ConfigResult, DownloadResult, IndexResult};

pub mod config;
pub mod http;

pub use config::ClientConfig;

use http::HttpHandler;

/// HTTP client shared by every source of a run
///
/// Cloning is cheap; the connection pool is shared between clones.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    http_handler: HttpHandler,
}

impl ArchiveClient {
    /// Creates a client with default settings
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the HTTP client cannot be built
    pub fn new() -> ConfigResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client with custom configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Client configuration settings
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the HTTP client cannot be built
    pub fn with_config(config: ClientConfig) -> ConfigResult<Self> {
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, &config);
        tracing::debug!("Created archive client ({})", config.user_agent);
        Ok(Self { http_handler })
    }

    /// Fetches the HTML content of a listing page, retrying transient failures
    ///
    /// # Errors
    ///
    /// Returns `IndexError` if the request fails after retries
    pub async fn get_page(&self, url: &Url) -> IndexResult<String> {
        self.http_handler.get_page(url).await
    }

    /// Opens a streaming response for an archive body
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport failure or non-success status
    pub async fn get_stream(&self, url: &Url) -> DownloadResult<reqwest::Response> {
        self.http_handler.get_stream(url).await
    }
}
