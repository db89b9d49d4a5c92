//! Archive download with atomic promotion
//!
//! The body is streamed into `<final>.downloading` in whole 1 MiB writes and
//! renamed onto the final path only after the transfer completes, so a reader
//! of the final path never observes a partial archive. Any failure before the
//! rename removes the temporary file and leaves the final path untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::app::client::ArchiveClient;
use crate::app::index::ArchiveIndex;
use crate::app::metadata::MetadataManager;
use crate::app::models::{is_newer, DownloadRecord, RemoteFile};
use crate::constants::files;
use crate::errors::{DownloadError, DownloadResult};
use crate::metrics::{MetricsRegistry, SourceMetricNames};

pub mod progress;

pub use progress::{format_hms, ProgressSnapshot, ProgressTracker, TransferSummary};

/// Remote resolution, freshness decision and transfer for one source
#[async_trait]
pub trait DownloadManager: Send + Sync {
    /// Latest archive on the remote listing; `None` on empty listing or network failure
    async fn find_latest_remote(&self) -> Option<RemoteFile>;

    /// Latest archive in the data directory
    async fn latest_local(&self) -> Option<PathBuf>;

    /// Whether `remote_filename` is newer than the recorded latest version
    async fn is_newer_version(&self, remote_filename: &str) -> bool;

    /// Download `remote` into the data directory and record it
    async fn download_file(&self, remote: &RemoteFile) -> DownloadResult<DownloadRecord>;
}

/// Download manager for ZIM archive mirrors
pub struct ZimDownloadManager {
    source_name: String,
    data_dir: PathBuf,
    index: ArchiveIndex,
    client: ArchiveClient,
    metadata: Arc<dyn MetadataManager>,
    metrics: Arc<MetricsRegistry>,
    metric_names: SourceMetricNames,
}

impl ZimDownloadManager {
    /// Creates a download manager
    ///
    /// # Arguments
    ///
    /// * `source_name` - Name of the source, used for metrics and logs
    /// * `data_dir` - Directory holding the archives
    /// * `index` - Resolver for the source's listing and data directory
    /// * `client` - Shared HTTP client
    /// * `metadata` - Download history of the source
    /// * `metrics` - Metrics sink
    pub fn new(
        source_name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        index: ArchiveIndex,
        client: ArchiveClient,
        metadata: Arc<dyn MetadataManager>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let source_name = source_name.into();
        let metric_names = SourceMetricNames::new(&source_name);
        Self {
            source_name,
            data_dir: data_dir.into(),
            index,
            client,
            metadata,
            metrics,
            metric_names,
        }
    }

    /// Data directory of the source
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Streams `url` into `temp_path` and returns the transfer totals
    async fn transfer(&self, url: &Url, temp_path: &Path) -> DownloadResult<TransferSummary> {
        let response = self.client.get_stream(url).await?;
        let total = response.content_length();
        match total {
            Some(size) => info!("Remote file size: {:.2} MB", size as f64 / (1024.0 * 1024.0)),
            None => debug!("Remote did not report a content length"),
        }

        let mut file = File::create(temp_path).await?;
        let mut tracker = ProgressTracker::new(total);
        let mut buffer: Vec<u8> = Vec::with_capacity(files::DOWNLOAD_CHUNK_SIZE);
        let mut stream = response.bytes_stream();

        while let Some(item) = stream.next().await {
            let bytes = item?;
            let mut data = &bytes[..];
            while !data.is_empty() {
                let take = (files::DOWNLOAD_CHUNK_SIZE - buffer.len()).min(data.len());
                buffer.extend_from_slice(&data[..take]);
                data = &data[take..];
                if buffer.len() == files::DOWNLOAD_CHUNK_SIZE {
                    file.write_all(&buffer).await?;
                    if let Some(snapshot) = tracker.advance(buffer.len() as u64) {
                        info!("{}", snapshot);
                    }
                    buffer.clear();
                }
            }
        }
        if !buffer.is_empty() {
            file.write_all(&buffer).await?;
            if let Some(snapshot) = tracker.advance(buffer.len() as u64) {
                info!("{}", snapshot);
            }
        }
        file.flush().await?;
        drop(file);

        let summary = tracker.finish();
        if let Some(expected) = total {
            if summary.bytes < expected {
                return Err(DownloadError::IncompleteDownload {
                    received: summary.bytes,
                    expected,
                });
            }
        }
        Ok(summary)
    }

    async fn remove_temp(&self, temp_path: &Path) {
        if temp_path.exists() {
            if let Err(e) = tokio::fs::remove_file(temp_path).await {
                warn!("Could not remove partial download {}: {}", temp_path.display(), e);
            } else {
                debug!("Removed partial download {}", temp_path.display());
            }
        }
    }
}

/// Path of the in-progress file for `final_path`
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut raw = final_path.as_os_str().to_owned();
    raw.push(files::TEMP_FILE_SUFFIX);
    PathBuf::from(raw)
}

#[async_trait]
impl DownloadManager for ZimDownloadManager {
    async fn find_latest_remote(&self) -> Option<RemoteFile> {
        self.index.find_latest_remote().await
    }

    async fn latest_local(&self) -> Option<PathBuf> {
        self.index.find_latest_local(&self.data_dir).await
    }

    async fn is_newer_version(&self, remote_filename: &str) -> bool {
        let stored = self.metadata.latest_version().await;
        let newer = is_newer(remote_filename, stored.as_deref());
        debug!(
            "{} vs stored {:?}: newer = {}",
            remote_filename, stored, newer
        );
        newer
    }

    async fn download_file(&self, remote: &RemoteFile) -> DownloadResult<DownloadRecord> {
        let final_path = self.data_dir.join(&remote.filename);
        let temp_path = temp_path_for(&final_path);
        info!("Downloading {} to {}", remote.url, final_path.display());

        let transferred = match tokio::fs::create_dir_all(&self.data_dir).await {
            Ok(()) => self.transfer(&remote.url, &temp_path).await,
            Err(e) => Err(DownloadError::Io(e)),
        };
        let summary = match transferred {
            Ok(summary) => summary,
            Err(e) => {
                error!("Download of {} failed: {}", remote.filename, e);
                self.remove_temp(&temp_path).await;
                self.metrics.increment(&self.metric_names.download_failures);
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            error!(
                "Could not move {} to {}: {}",
                temp_path.display(),
                final_path.display(),
                e
            );
            self.remove_temp(&temp_path).await;
            self.metrics.increment(&self.metric_names.download_failures);
            return Err(DownloadError::AtomicOperationFailed {
                temp_path,
                final_path,
            });
        }
        info!("Download complete: {}", summary);

        self.metrics.increment(&self.metric_names.download_count);
        self.metrics
            .set_gauge(&self.metric_names.last_download_size_bytes, summary.bytes as f64);
        self.metrics.set_gauge(
            &self.metric_names.last_download_time_seconds,
            summary.elapsed.as_secs_f64(),
        );

        match self.metadata.record_download(&remote.filename, summary.bytes).await {
            Ok(record) => Ok(record),
            Err(e) => {
                error!(
                    "Downloaded {} for {} but could not record it: {}",
                    remote.filename, self.source_name, e
                );
                self.metrics.increment(&self.metric_names.download_failures);
                Err(e.into())
            }
        }
    }
}
