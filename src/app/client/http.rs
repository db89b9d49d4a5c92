//! Core HTTP operations with retry logic
//!
//! Listing requests are retried with exponential backoff on transport errors,
//! HTTP 429 and HTTP 503. Archive downloads are a single attempt with a long
//! per-request timeout.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use url::Url;

use crate::app::client::config::ClientConfig;
use crate::errors::{DownloadError, DownloadResult, IndexError, IndexResult};

/// HTTP operations handler with resilience patterns
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Client,
    listing_timeout: Duration,
    download_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler around an already-built client
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client to use for requests
    /// * `config` - Timeouts and retry policy
    pub fn new(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            listing_timeout: config.listing_timeout,
            download_timeout: config.download_timeout,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * 2_u32.saturating_pow(attempt)
    }

    /// Fetches a listing response with retry logic
    ///
    /// # Errors
    ///
    /// Returns `IndexError` if the server keeps failing after retries or
    /// answers with a non-success status
    pub async fn get_response(&self, url: &Url) -> IndexResult<Response> {
        let mut retries = 0;
        loop {
            match self
                .client
                .get(url.as_str())
                .timeout(self.listing_timeout)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE
                    {
                        if retries < self.max_retries {
                            retries += 1;
                            let delay = self.backoff_delay(retries);
                            tracing::warn!(
                                "Listing request answered {}. Backing off for {}ms",
                                status.as_u16(),
                                delay.as_millis()
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                            IndexError::RateLimitExceeded
                        } else {
                            IndexError::ServerOverloaded
                        });
                    }

                    if !status.is_success() {
                        return Err(IndexError::ServerError {
                            status: status.as_u16(),
                        });
                    }

                    tracing::debug!("Successfully fetched response: {}", url);
                    return Ok(response);
                }
                Err(e) if retries < self.max_retries => {
                    retries += 1;
                    let delay = self.backoff_delay(retries);
                    tracing::warn!(
                        "Listing request failed (attempt {}/{}): {}. Retrying in {}ms",
                        retries,
                        self.max_retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if self.max_retries == 0 => return Err(IndexError::Http(e)),
                Err(e) => {
                    tracing::error!(
                        "Listing request failed after {} retries: {}",
                        self.max_retries,
                        e
                    );
                    return Err(IndexError::MaxRetriesExceeded {
                        max_retries: self.max_retries,
                    });
                }
            }
        }
    }

    /// Fetches the HTML content of a listing page
    ///
    /// # Errors
    ///
    /// Returns `IndexError` if the request fails after retries or the body
    /// cannot be read
    pub async fn get_page(&self, url: &Url) -> IndexResult<String> {
        let response = self.get_response(url).await?;
        let text = response.text().await?;
        tracing::debug!("Successfully fetched page: {}", url);
        Ok(text)
    }

    /// Opens a streaming archive response in a single attempt
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::ServerError` for a non-success status and
    /// `DownloadError::Http` for transport failures
    pub async fn get_stream(&self, url: &Url) -> DownloadResult<Response> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(self.download_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DownloadError::ServerError {
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}
