//! Backup rotation for the current archive
//!
//! Before a new archive is downloaded, the current one is copied to
//! `<backup_dir>/<stem>_backup_<YYYYmmddHHMMSS>.zim` and the copy is checked
//! against the source size. After a verified backup, backups beyond the
//! retention count are deleted, newest kept first by modification time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::app::download::DownloadManager;
use crate::constants::files;
use crate::errors::{BackupError, BackupResult};
use crate::metrics::{MetricsRegistry, SourceMetricNames};

/// Result of a backup attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// No local archive exists yet
    NothingToBackup,
    /// A verified copy was written
    Created { path: PathBuf, size_bytes: u64 },
}

impl BackupOutcome {
    /// Path of the written backup, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            BackupOutcome::NothingToBackup => None,
            BackupOutcome::Created { path, .. } => Some(path),
        }
    }
}

/// A backup file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

/// Protection of the current archive before it is replaced
#[async_trait]
pub trait BackupManager: Send + Sync {
    /// Copy the current archive into the backup directory and prune old copies
    async fn backup_current(&self) -> BackupResult<BackupOutcome>;

    /// Delete backups beyond the retention count; returns the removed paths
    async fn prune_old_backups(&self) -> BackupResult<Vec<PathBuf>>;

    /// Backups of this source, newest first
    async fn list_backups(&self) -> BackupResult<Vec<BackupFile>>;
}

/// Backup manager for ZIM archives
pub struct ZimBackupManager {
    source_name: String,
    backup_dir: PathBuf,
    max_backups: usize,
    downloads: Arc<dyn DownloadManager>,
    metrics: Arc<MetricsRegistry>,
    metric_names: SourceMetricNames,
}

impl ZimBackupManager {
    /// Creates a backup manager
    ///
    /// `downloads` locates the current archive of the source.
    pub fn new(
        source_name: impl Into<String>,
        backup_dir: impl Into<PathBuf>,
        max_backups: usize,
        downloads: Arc<dyn DownloadManager>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let source_name = source_name.into();
        let metric_names = SourceMetricNames::new(&source_name);
        Self {
            source_name,
            backup_dir: backup_dir.into(),
            max_backups,
            downloads,
            metrics,
            metric_names,
        }
    }

    /// Backup directory of the source
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    async fn copy_verified(&self, current: &Path, backup_path: &Path) -> BackupResult<u64> {
        tokio::fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|_| BackupError::DirectoryNotAccessible {
                path: self.backup_dir.clone(),
            })?;

        let expected = file_size(current).await?;
        tokio::fs::copy(current, backup_path)
            .await
            .map_err(|source| BackupError::Io {
                path: backup_path.to_path_buf(),
                source,
            })?;

        let actual = file_size(backup_path).await?;
        if actual != expected {
            if let Err(e) = tokio::fs::remove_file(backup_path).await {
                warn!("Could not remove bad backup {}: {}", backup_path.display(), e);
            }
            return Err(BackupError::SizeMismatch { expected, actual });
        }
        Ok(actual)
    }
}

/// Backup filename for an archive, stamped with the given local time
pub fn backup_file_name(current: &Path, stamp: &chrono::DateTime<Local>) -> String {
    let stem = current
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "{}{}{}.{}",
        stem,
        files::BACKUP_MARKER,
        stamp.format(files::BACKUP_TIMESTAMP_FORMAT),
        files::ARCHIVE_EXTENSION
    )
}

fn is_backup_name(name: &str) -> bool {
    name.contains(files::BACKUP_MARKER)
        && name.ends_with(&format!(".{}", files::ARCHIVE_EXTENSION))
}

async fn file_size(path: &Path) -> BackupResult<u64> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|source| BackupError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[async_trait]
impl BackupManager for ZimBackupManager {
    async fn backup_current(&self) -> BackupResult<BackupOutcome> {
        let Some(current) = self.downloads.latest_local().await else {
            info!("No local file for {}; nothing to back up", self.source_name);
            return Ok(BackupOutcome::NothingToBackup);
        };

        let backup_path = self
            .backup_dir
            .join(backup_file_name(&current, &Local::now()));
        info!("Backing up {} to {}", current.display(), backup_path.display());

        let started = Instant::now();
        let size_bytes = match self.copy_verified(&current, &backup_path).await {
            Ok(size) => size,
            Err(e) => {
                error!("Backup of {} failed: {}", current.display(), e);
                self.metrics.increment(&self.metric_names.backup_failures);
                return Err(e);
            }
        };

        self.metrics.increment(&self.metric_names.backup_count);
        self.metrics
            .set_gauge(&self.metric_names.backup_last_size_bytes, size_bytes as f64);
        self.metrics.set_gauge(
            &self.metric_names.backup_last_time_seconds,
            started.elapsed().as_secs_f64(),
        );
        info!("Backup verified: {} ({} bytes)", backup_path.display(), size_bytes);

        match self.prune_old_backups().await {
            Ok(removed) if !removed.is_empty() => {
                info!("Pruned {} old backups of {}", removed.len(), self.source_name)
            }
            Ok(_) => {}
            Err(e) => warn!("Could not prune backups of {}: {}", self.source_name, e),
        }

        Ok(BackupOutcome::Created {
            path: backup_path,
            size_bytes,
        })
    }

    async fn prune_old_backups(&self) -> BackupResult<Vec<PathBuf>> {
        let backups = self.list_backups().await?;
        let mut removed = Vec::new();
        for backup in backups.into_iter().skip(self.max_backups) {
            tokio::fs::remove_file(&backup.path)
                .await
                .map_err(|source| BackupError::Io {
                    path: backup.path.clone(),
                    source,
                })?;
            debug!("Removed old backup {}", backup.path.display());
            removed.push(backup.path);
        }
        Ok(removed)
    }

    async fn list_backups(&self) -> BackupResult<Vec<BackupFile>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let io_error = |source| BackupError::Io {
            path: self.backup_dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.backup_dir)
            .await
            .map_err(io_error)?;
        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let name = entry.file_name();
            if !is_backup_name(&name.to_string_lossy()) {
                continue;
            }
            let metadata = entry.metadata().await.map_err(io_error)?;
            if !metadata.is_file() {
                continue;
            }
            backups.push(BackupFile {
                path: entry.path(),
                modified: metadata.modified().map_err(io_error)?,
                size_bytes: metadata.len(),
            });
        }

        backups.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(backups)
    }
}
