//! Persisted download history
//!
//! Every data directory holds one `downloads_metadata.json`: a JSON array of
//! per-source entries, shared by all sources configured against that
//! directory. Loading is forgiving. A missing or malformed file reads as an
//! empty history, and a single legacy object is read as a one-element array.
//! Recording a download rewrites only the recording source's entry; other
//! entries go back to disk as they were read, unknown fields included.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::app::models::{version_token, DownloadRecord, SourceMetadata};
use crate::constants::METADATA_FILE_NAME;
use crate::errors::{MetadataError, MetadataResult};

/// Download history of one source
#[async_trait]
pub trait MetadataManager: Send + Sync {
    /// Every entry in the store; never fails
    async fn load(&self) -> Vec<SourceMetadata>;

    /// Replace the store with `entries`
    async fn save(&self, entries: &[SourceMetadata]) -> MetadataResult<()>;

    /// Append a record for `filename` to this source's history
    async fn record_download(&self, filename: &str, size_bytes: u64) -> MetadataResult<DownloadRecord>;

    /// Version of the most recent download of this source
    async fn latest_version(&self) -> Option<String>;

    /// This source's entry, if it has one
    async fn source_metadata(&self) -> Option<SourceMetadata>;
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct JsonMetadataStore {
    source_name: String,
    path: PathBuf,
}

impl JsonMetadataStore {
    /// Store at `<data_dir>/downloads_metadata.json` for one source
    pub fn new(source_name: impl Into<String>, data_dir: &Path) -> Self {
        Self {
            source_name: source_name.into(),
            path: data_dir.join(METADATA_FILE_NAME),
        }
    }

    /// Location of the JSON file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Top-level entries exactly as stored
    fn raw_entries(&self, content: &str) -> Vec<Value> {
        let value: Value = match serde_json::from_str(content) {
            Ok(value) => value,
            Err(e) => {
                warn!("Metadata file {} is not valid JSON ({}); starting empty", self.path.display(), e);
                return Vec::new();
            }
        };

        match value {
            Value::Array(items) => items,
            Value::Object(_) => {
                warn!("Metadata file {} holds a single object; reading it as a list", self.path.display());
                vec![value]
            }
            Value::Null => Vec::new(),
            other => {
                warn!("Unexpected metadata layout in {}: {}", self.path.display(), other);
                Vec::new()
            }
        }
    }

    fn parse_entries(&self, content: &str) -> Vec<SourceMetadata> {
        let raw_entries = self.raw_entries(content);
        let single_legacy_entry = raw_entries.len() == 1;

        let mut entries = Vec::with_capacity(raw_entries.len());
        for raw in raw_entries {
            match serde_json::from_value::<SourceMetadata>(raw) {
                Ok(mut entry) => {
                    if entry.source_name.is_empty() && single_legacy_entry {
                        info!("Adopting legacy metadata entry for source {}", self.source_name);
                        entry.source_name = self.source_name.clone();
                    }
                    entry.normalize();
                    entries.push(entry);
                }
                Err(e) => warn!("Skipping invalid metadata entry in {}: {}", self.path.display(), e),
            }
        }
        entries
    }

    /// Stored entries for a rewrite; only a missing file reads as empty
    async fn read_raw(&self) -> MetadataResult<Vec<Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(self.raw_entries(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Position of this source's entry, adopting a lone entry without a name
    fn own_entry(&self, entries: &[Value]) -> Option<usize> {
        let name_of = |entry: &Value| entry.get("source_name").and_then(Value::as_str).map(str::to_string);

        if let Some(index) = entries
            .iter()
            .position(|entry| name_of(entry).as_deref() == Some(self.source_name.as_str()))
        {
            return Some(index);
        }
        match entries {
            [only] if name_of(only).map_or(true, |name| name.is_empty()) => {
                info!("Adopting legacy metadata entry for source {}", self.source_name);
                Some(0)
            }
            _ => None,
        }
    }

    /// `entry` with `record` appended; fields this crate does not know are kept
    fn with_record(&self, entry: Value, record: &DownloadRecord) -> MetadataResult<Value> {
        let mut object = match entry {
            Value::Object(object) => object,
            other => {
                warn!("Replacing unreadable metadata entry for {}: {}", self.source_name, other);
                Map::new()
            }
        };

        object.insert("source_name".to_string(), Value::String(self.source_name.clone()));
        let downloads = object
            .entry("downloads")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !downloads.is_array() {
            warn!("Download history of {} is not a list; starting a new one", self.source_name);
            *downloads = Value::Array(Vec::new());
        }
        if let Value::Array(items) = downloads {
            items.push(serde_json::to_value(record)?);
        }
        object.insert("latest_version".to_string(), Value::String(record.version.clone()));
        object.insert(
            "latest_download_date".to_string(),
            Value::String(record.download_date.clone()),
        );
        Ok(Value::Object(object))
    }

    /// Write through a temp file and rename over the store
    async fn write_atomically(&self, content: String) -> MetadataResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> MetadataError {
        MetadataError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl MetadataManager for JsonMetadataStore {
    async fn load(&self) -> Vec<SourceMetadata> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => self.parse_entries(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No metadata file at {}", self.path.display());
                Vec::new()
            }
            Err(e) => {
                warn!("Could not read metadata file {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    async fn save(&self, entries: &[SourceMetadata]) -> MetadataResult<()> {
        self.write_atomically(serde_json::to_string_pretty(entries)?)
            .await?;
        debug!("Saved {} metadata entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    /// Rewrites only this source's entry; every other entry is written back as read
    async fn record_download(&self, filename: &str, size_bytes: u64) -> MetadataResult<DownloadRecord> {
        let version = version_token(filename).ok_or_else(|| MetadataError::MissingVersion {
            filename: filename.to_string(),
        })?;
        let record = DownloadRecord::new(filename, version, size_bytes, Utc::now());

        let mut entries = self.read_raw().await?;
        match self.own_entry(&entries) {
            Some(index) => {
                let entry = std::mem::take(&mut entries[index]);
                entries[index] = self.with_record(entry, &record)?;
            }
            None => {
                let entry = serde_json::to_value(SourceMetadata::new(&self.source_name))?;
                entries.push(self.with_record(entry, &record)?);
            }
        }
        self.write_atomically(serde_json::to_string_pretty(&entries)?)
            .await?;

        info!(
            "Recorded download of {} (version {}) for {}",
            record.filename, record.version, self.source_name
        );
        Ok(record)
    }

    async fn latest_version(&self) -> Option<String> {
        self.source_metadata().await.and_then(|m| m.latest_version)
    }

    async fn source_metadata(&self) -> Option<SourceMetadata> {
        self.load()
            .await
            .into_iter()
            .find(|e| e.source_name == self.source_name)
    }
}
