//! Data models for archive sources, versions, and download history
//!
//! This module defines the records that flow through the update protocol:
//! the per-source configuration, the `YYYY-MM` version token embedded in
//! archive filenames, and the persisted download history.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::sources;
use crate::errors::{ConfigError, ConfigResult};

/// Version token of an archive, ordered as a `(year, month)` tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveVersion {
    pub year: u16,
    pub month: u8,
}

fn filename_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_(\d{4})-(\d{2})\.").expect("static version regex"))
}

fn stored_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})").expect("static version regex"))
}

impl ArchiveVersion {
    /// Build a version, rejecting months outside 1..=12
    pub fn new(year: u16, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Extract the version from an archive filename (`..._YYYY-MM.zim`)
    pub fn from_filename(filename: &str) -> Option<Self> {
        let caps = filename_token_regex().captures(filename)?;
        Self::from_parts(&caps[1], &caps[2])
    }

    /// Parse a stored version string (`YYYY-MM`)
    pub fn parse(version: &str) -> Option<Self> {
        let caps = stored_version_regex().captures(version)?;
        Self::from_parts(&caps[1], &caps[2])
    }

    fn from_parts(year: &str, month: &str) -> Option<Self> {
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }
}

impl fmt::Display for ArchiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Decide whether a remote archive is newer than the stored latest version
///
/// An unparseable remote filename is never newer, so an ambiguous listing does
/// not trigger a download. A malformed stored version is always older, so
/// corrupt bookkeeping cannot block updates forever.
pub fn is_newer(remote_filename: &str, stored_version: Option<&str>) -> bool {
    let Some(stored) = stored_version else {
        return true;
    };
    let Some(remote) = ArchiveVersion::from_filename(remote_filename) else {
        tracing::warn!("Could not extract version from filename: {}", remote_filename);
        return false;
    };
    match ArchiveVersion::parse(stored) {
        Some(local) => remote > local,
        None => {
            tracing::warn!("Stored version is malformed: {}", stored);
            true
        }
    }
}

/// Extract the raw `YYYY-MM` token from a filename without validating the month
///
/// The metadata store records exactly what the filename carries.
pub fn version_token(filename: &str) -> Option<String> {
    filename_token_regex()
        .captures(filename)
        .map(|caps| format!("{}-{}", &caps[1], &caps[2]))
}

/// One archive feed, immutable for the duration of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique key of the source; also prefixes its metrics
    pub name: String,
    /// Listing endpoint
    #[serde(default = "default_source_url")]
    pub source_url: String,
    /// Regex for valid archive filenames, embedding a version token
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    /// Where archives and the metadata store live
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// Where rotated backups live
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
    /// Retention count for backups
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

fn default_source_url() -> String {
    sources::DEFAULT_SOURCE_URL.to_string()
}

fn default_file_pattern() -> String {
    sources::DEFAULT_FILE_PATTERN.to_string()
}

fn default_max_backups() -> usize {
    sources::DEFAULT_MAX_BACKUPS
}

impl SourceConfig {
    /// Create a source with default pattern, directories and retention
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            file_pattern: default_file_pattern(),
            storage_path: None,
            backup_path: None,
            max_backups: default_max_backups(),
        }
    }

    /// Set the filename pattern
    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    /// Set the data directory
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Set the backup directory
    pub fn with_backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(path.into());
        self
    }

    /// Set the backup retention count
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Data directory, defaulting to `data/<name>`
    pub fn data_dir(&self) -> PathBuf {
        self.storage_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("data").join(&self.name))
    }

    /// Backup directory, defaulting to `backup/<name>`
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("backup").join(&self.name))
    }

    /// Listing URL with a guaranteed trailing slash, so filenames join beneath it
    pub fn listing_url(&self) -> ConfigResult<Url> {
        let mut raw = self.source_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
            field: format!("{}.source_url", self.name),
            value: self.source_url.clone(),
            reason: e.to_string(),
        })
    }

    /// Check the fields that cannot be defaulted
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "name".to_string(),
            });
        }
        if self.max_backups == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.max_backups", self.name),
                value: "0".to_string(),
                reason: "At least one backup must be retained".to_string(),
            });
        }
        if let Err(e) = Regex::new(&self.file_pattern) {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.file_pattern", self.name),
                value: self.file_pattern.clone(),
                reason: e.to_string(),
            });
        }
        self.listing_url().map(|_| ())
    }
}

/// Latest archive advertised by a remote listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub filename: String,
    pub url: Url,
}

/// One completed download; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub filename: String,
    pub version: String,
    pub size_bytes: u64,
    /// Human-readable instant (ISO-8601)
    pub download_date: String,
    /// Epoch seconds
    pub download_timestamp: f64,
}

impl DownloadRecord {
    /// Create a record stamped with the given instant
    pub fn new(
        filename: impl Into<String>,
        version: impl Into<String>,
        size_bytes: u64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: filename.into(),
            version: version.into(),
            size_bytes,
            download_date: at.to_rfc3339(),
            download_timestamp: at.timestamp_millis() as f64 / 1000.0,
        }
    }
}

/// Download history of one source
///
/// `latest_version` mirrors the version of the last element of `downloads`
/// and is absent when the history is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub downloads: Vec<DownloadRecord>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub latest_download_date: Option<String>,
}

impl SourceMetadata {
    /// Empty history for a source
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            downloads: Vec::new(),
            latest_version: None,
            latest_download_date: None,
        }
    }

    /// Re-derive `latest_*` from the history after loading hand-edited files
    pub fn normalize(&mut self) {
        match self.downloads.last() {
            Some(last) => {
                self.latest_version = Some(last.version.clone());
                self.latest_download_date = Some(last.download_date.clone());
            }
            None => {
                self.latest_version = None;
                self.latest_download_date = None;
            }
        }
    }
}
