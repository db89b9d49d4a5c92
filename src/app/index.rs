//! Remote listing and local directory resolution
//!
//! Archive filenames embed a zero-padded `YYYY-MM` token, so the latest
//! archive is simply the lexicographically greatest filename matching the
//! source pattern. Patterns are anchored at both ends: a filename matches only
//! when the whole name fits, which keeps `.downloading` leftovers out of the
//! local scan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::client::ArchiveClient;
use crate::app::models::{RemoteFile, SourceConfig};
use crate::errors::{ConfigError, ConfigResult, IndexError, IndexResult};

/// Resolver for the newest archive of one source
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    client: ArchiveClient,
    listing_url: Url,
    /// Anchored file pattern, shared by the listing and the directory scan
    pattern: Regex,
}

impl ArchiveIndex {
    /// Create a resolver for a source
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the pattern or listing URL is invalid
    pub fn new(client: ArchiveClient, source: &SourceConfig) -> ConfigResult<Self> {
        let listing_url = source.listing_url()?;
        let pattern = anchored(&source.file_pattern).map_err(|e| invalid_pattern(source, e))?;
        Ok(Self {
            client,
            listing_url,
            pattern,
        })
    }

    /// Listing endpoint of the source
    pub fn listing_url(&self) -> &Url {
        &self.listing_url
    }

    /// Latest matching archive on the remote listing
    ///
    /// Network failures and empty listings are logged and yield `None`; the
    /// caller treats both as "no update found".
    pub async fn find_latest_remote(&self) -> Option<RemoteFile> {
        match self.try_find_latest_remote().await {
            Ok(Some(remote)) => {
                info!("Latest remote file: {}", remote.filename);
                Some(remote)
            }
            Ok(None) => {
                warn!("No matching files found on {}", self.listing_url);
                None
            }
            Err(e) => {
                warn!("Could not fetch listing {}: {}", self.listing_url, e);
                None
            }
        }
    }

    /// Latest matching archive on the remote listing, surfacing fetch errors
    ///
    /// # Errors
    ///
    /// Returns `IndexError` if the listing cannot be fetched
    async fn try_find_latest_remote(&self) -> IndexResult<Option<RemoteFile>> {
        debug!("Fetching listing {}", self.listing_url);
        let html = self.client.get_page(&self.listing_url).await?;
        Ok(self.latest_in_listing(&html))
    }

    /// Latest matching archive linked from a listing page
    pub fn latest_in_listing(&self, html: &str) -> Option<RemoteFile> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").ok()?;

        // Keyed by filename so the greatest match wins; first href per name kept
        let mut matches: BTreeMap<String, String> = BTreeMap::new();
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let filename = href_basename(href);
            if self.pattern.is_match(filename) {
                matches
                    .entry(filename.to_string())
                    .or_insert_with(|| href.to_string());
            }
        }
        debug!("Listing has {} matching files", matches.len());

        let (filename, href) = matches.into_iter().next_back()?;
        match self.listing_url.join(&href) {
            Ok(url) => Some(RemoteFile { filename, url }),
            Err(e) => {
                warn!("Could not resolve link {} against {}: {}", href, self.listing_url, e);
                None
            }
        }
    }

    /// Latest matching archive in a local directory
    ///
    /// A missing or unreadable directory is treated as holding no archive.
    pub async fn find_latest_local(&self, dir: &Path) -> Option<PathBuf> {
        match self.try_find_latest_local(dir).await {
            Ok(found) => found,
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// Latest matching archive in a local directory, surfacing scan errors
    ///
    /// # Errors
    ///
    /// Returns `IndexError::DirectoryScan` if the directory exists but cannot be read
    async fn try_find_latest_local(&self, dir: &Path) -> IndexResult<Option<PathBuf>> {
        if !dir.exists() {
            debug!("Local directory does not exist: {}", dir.display());
            return Ok(None);
        }

        let scan_error = |source| IndexError::DirectoryScan {
            path: dir.to_path_buf(),
            source,
        };
        let mut entries = tokio::fs::read_dir(dir).await.map_err(scan_error)?;

        let mut latest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !self.pattern.is_match(&name) {
                continue;
            }
            if latest.as_ref().map_or(true, |current| name > *current) {
                latest = Some(name);
            }
        }

        Ok(latest.map(|name| dir.join(name)))
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

fn invalid_pattern(source: &SourceConfig, error: regex::Error) -> ConfigError {
    ConfigError::InvalidValue {
        field: format!("{}.file_pattern", source.name),
        value: source.file_pattern.clone(),
        reason: error.to_string(),
    }
}

/// Last path segment of an href, without query or fragment
fn href_basename(href: &str) -> &str {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/').next().unwrap_or(path)
}
