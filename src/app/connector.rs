//! Update orchestration for one source
//!
//! The connector drives
//! `Idle -> Checking -> (UpToDate | BackingUp -> Downloading -> Verifying -> Done) | Failed`.
//! Each step must succeed before the next starts. A failed step is never
//! undone: a verified backup survives a failed download, and an archive that
//! fails verification is left in place for inspection.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::app::backup::BackupManager;
use crate::app::download::DownloadManager;
use crate::app::metadata::MetadataManager;
use crate::app::models::{ArchiveVersion, DownloadRecord, RemoteFile, SourceConfig, SourceMetadata};
use crate::app::verification::VerificationService;
use crate::errors::{UpdateError, UpdateResult};
use crate::metrics::{MetricsRegistry, SourceMetricNames};

/// Protocol state of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate,
    BackingUp,
    Downloading,
    Verifying,
    Done,
    Failed,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::UpToDate => "up_to_date",
            UpdateState::BackingUp => "backing_up",
            UpdateState::Downloading => "downloading",
            UpdateState::Verifying => "verifying",
            UpdateState::Done => "done",
            UpdateState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why an update is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    Forced,
    NoLocalFile,
    NewerVersion,
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateReason::Forced => f.write_str("forced"),
            UpdateReason::NoLocalFile => f.write_str("no local file"),
            UpdateReason::NewerVersion => f.write_str("newer version available"),
        }
    }
}

/// Result of the checking step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    UpToDate { remote: RemoteFile },
    Available { remote: RemoteFile, reason: UpdateReason },
}

impl UpdateCheck {
    /// Latest remote archive the decision was made on
    pub fn remote(&self) -> &RemoteFile {
        match self {
            UpdateCheck::UpToDate { remote } | UpdateCheck::Available { remote, .. } => remote,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, UpdateCheck::Available { .. })
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Nothing to do
    UpToDate { remote: RemoteFile },
    /// A new archive was downloaded and verified
    Updated {
        record: DownloadRecord,
        backup: Option<PathBuf>,
    },
}

/// Entry point the CLI drives, one per source
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Name of the source
    fn source_name(&self) -> &str;

    /// Current protocol state
    fn state(&self) -> UpdateState;

    /// Decide whether the latest remote archive should be downloaded
    async fn check_for_update(&mut self, force: bool) -> UpdateResult<UpdateCheck>;

    /// Run the whole protocol
    async fn run_update(&mut self, force: bool) -> UpdateResult<UpdateOutcome>;

    /// Download history of the source
    async fn source_metadata(&self) -> Option<SourceMetadata>;

    /// Run the protocol and report success as a flag; failures are logged
    async fn update_if_needed(&mut self, force: bool) -> bool {
        match self.run_update(force).await {
            Ok(UpdateOutcome::UpToDate { remote }) => {
                info!("{} is up to date ({})", self.source_name(), remote.filename);
                true
            }
            Ok(UpdateOutcome::Updated { record, .. }) => {
                info!(
                    "{} updated to {} (version {})",
                    self.source_name(),
                    record.filename,
                    record.version
                );
                true
            }
            Err(e) => {
                error!(
                    "Update of {} failed while {}: {}",
                    self.source_name(),
                    e.stage(),
                    e
                );
                false
            }
        }
    }
}

/// Connector for a ZIM archive source
pub struct ZimConnector {
    source: SourceConfig,
    metadata: Arc<dyn MetadataManager>,
    downloads: Arc<dyn DownloadManager>,
    backups: Box<dyn BackupManager>,
    verifier: Box<dyn VerificationService>,
    metrics: Arc<MetricsRegistry>,
    metric_names: SourceMetricNames,
    state: UpdateState,
}

impl ZimConnector {
    /// Assemble a connector from its components
    pub fn new(
        source: SourceConfig,
        metadata: Arc<dyn MetadataManager>,
        downloads: Arc<dyn DownloadManager>,
        backups: Box<dyn BackupManager>,
        verifier: Box<dyn VerificationService>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let metric_names = SourceMetricNames::new(&source.name);
        Self {
            source,
            metadata,
            downloads,
            backups,
            verifier,
            metrics,
            metric_names,
            state: UpdateState::Idle,
        }
    }

    /// Configuration of the source
    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    fn fail(&mut self, error: impl Into<UpdateError>) -> UpdateError {
        self.state = UpdateState::Failed;
        error.into()
    }
}

#[async_trait]
impl SourceConnector for ZimConnector {
    fn source_name(&self) -> &str {
        &self.source.name
    }

    fn state(&self) -> UpdateState {
        self.state
    }

    async fn check_for_update(&mut self, force: bool) -> UpdateResult<UpdateCheck> {
        self.state = UpdateState::Checking;
        self.metrics.increment(&self.metric_names.check_count);
        info!("Checking for updates to {}", self.source.name);

        let Some(remote) = self.downloads.find_latest_remote().await else {
            return Err(self.fail(UpdateError::NoRemoteFile {
                source_name: self.source.name.clone(),
            }));
        };

        if force {
            info!("Forced update of {}", self.source.name);
            return Ok(UpdateCheck::Available {
                remote,
                reason: UpdateReason::Forced,
            });
        }

        let Some(local) = self.downloads.latest_local().await else {
            info!("No local file for {}", self.source.name);
            return Ok(UpdateCheck::Available {
                remote,
                reason: UpdateReason::NoLocalFile,
            });
        };

        let mut newer = self.downloads.is_newer_version(&remote.filename).await;
        if newer {
            // History can lag behind the directory; the local archive's own token
            // settles it when both parse
            let local_version = local
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(ArchiveVersion::from_filename);
            if let (Some(local_version), Some(remote_version)) =
                (local_version, ArchiveVersion::from_filename(&remote.filename))
            {
                newer = remote_version > local_version;
            }
        }

        if newer {
            info!("Newer version available: {}", remote.filename);
            Ok(UpdateCheck::Available {
                remote,
                reason: UpdateReason::NewerVersion,
            })
        } else {
            info!(
                "{} is current (local {}, remote {})",
                self.source.name,
                local.display(),
                remote.filename
            );
            self.state = UpdateState::UpToDate;
            Ok(UpdateCheck::UpToDate { remote })
        }
    }

    async fn run_update(&mut self, force: bool) -> UpdateResult<UpdateOutcome> {
        let remote = match self.check_for_update(force).await? {
            UpdateCheck::UpToDate { remote } => {
                self.state = UpdateState::UpToDate;
                return Ok(UpdateOutcome::UpToDate { remote });
            }
            UpdateCheck::Available { remote, reason } => {
                info!("Updating {} to {} ({})", self.source.name, remote.filename, reason);
                remote
            }
        };

        self.state = UpdateState::BackingUp;
        let backup = match self.backups.backup_current().await {
            Ok(outcome) => outcome.path().map(|p| p.to_path_buf()),
            Err(e) => return Err(self.fail(e)),
        };

        self.state = UpdateState::Downloading;
        let record = match self.downloads.download_file(&remote).await {
            Ok(record) => record,
            Err(e) => {
                if let Some(backup) = &backup {
                    warn!("Previous archive remains backed up at {}", backup.display());
                }
                return Err(self.fail(e));
            }
        };

        self.state = UpdateState::Verifying;
        let final_path = self.source.data_dir().join(&record.filename);
        if let Err(e) = self.verifier.verify(&final_path).await {
            warn!("Leaving {} in place for inspection", final_path.display());
            return Err(self.fail(e));
        }

        self.state = UpdateState::Done;
        Ok(UpdateOutcome::Updated { record, backup })
    }

    async fn source_metadata(&self) -> Option<SourceMetadata> {
        self.metadata.source_metadata().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::backup::{BackupFile, BackupOutcome};
    use crate::errors::{
        BackupError, BackupResult, DownloadError, DownloadResult, MetadataResult,
        VerificationError, VerificationResult,
    };
    use chrono::Utc;
    use std::path::Path;
    use std::sync::Mutex;
    use url::Url;

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    fn remote(filename: &str) -> RemoteFile {
        RemoteFile {
            filename: filename.to_string(),
            url: Url::parse("https://mirror.example.org/zim/")
                .unwrap()
                .join(filename)
                .unwrap(),
        }
    }

    struct FakeMetadata(Option<String>);

    #[async_trait]
    impl MetadataManager for FakeMetadata {
        async fn load(&self) -> Vec<SourceMetadata> {
            Vec::new()
        }
        async fn save(&self, _entries: &[SourceMetadata]) -> MetadataResult<()> {
            Ok(())
        }
        async fn record_download(&self, filename: &str, size_bytes: u64) -> MetadataResult<DownloadRecord> {
            Ok(DownloadRecord::new(filename, "2024-01", size_bytes, Utc::now()))
        }
        async fn latest_version(&self) -> Option<String> {
            self.0.clone()
        }
        async fn source_metadata(&self) -> Option<SourceMetadata> {
            None
        }
    }

    struct FakeDownloads {
        remote: Option<RemoteFile>,
        local: Option<PathBuf>,
        stored: Option<String>,
        fail: bool,
        log: CallLog,
    }

    #[async_trait]
    impl DownloadManager for FakeDownloads {
        async fn find_latest_remote(&self) -> Option<RemoteFile> {
            self.remote.clone()
        }
        async fn latest_local(&self) -> Option<PathBuf> {
            self.local.clone()
        }
        async fn is_newer_version(&self, remote_filename: &str) -> bool {
            crate::app::models::is_newer(remote_filename, self.stored.as_deref())
        }
        async fn download_file(&self, remote: &RemoteFile) -> DownloadResult<DownloadRecord> {
            self.log.lock().unwrap().push("download");
            if self.fail {
                return Err(DownloadError::ServerError { status: 500 });
            }
            Ok(DownloadRecord::new(&remote.filename, "2024-01", 10, Utc::now()))
        }
    }

    struct FakeBackups {
        fail: bool,
        log: CallLog,
    }

    #[async_trait]
    impl BackupManager for FakeBackups {
        async fn backup_current(&self) -> BackupResult<BackupOutcome> {
            self.log.lock().unwrap().push("backup");
            if self.fail {
                return Err(BackupError::SizeMismatch { expected: 2, actual: 1 });
            }
            Ok(BackupOutcome::Created {
                path: PathBuf::from("backup/wiki_backup_20240101000000.zim"),
                size_bytes: 2,
            })
        }
        async fn prune_old_backups(&self) -> BackupResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        async fn list_backups(&self) -> BackupResult<Vec<BackupFile>> {
            Ok(Vec::new())
        }
    }

    struct FakeVerifier {
        fail: bool,
        log: CallLog,
    }

    #[async_trait]
    impl VerificationService for FakeVerifier {
        async fn verify(&self, path: &Path) -> VerificationResult<u64> {
            self.log.lock().unwrap().push("verify");
            if self.fail {
                return Err(VerificationError::Empty {
                    path: path.to_path_buf(),
                });
            }
            Ok(1)
        }
    }

    #[derive(Default)]
    struct Scenario {
        remote: Option<&'static str>,
        local: Option<&'static str>,
        stored: Option<&'static str>,
        fail_backup: bool,
        fail_download: bool,
        fail_verify: bool,
    }

    fn build(s: Scenario) -> (ZimConnector, CallLog, Arc<MetricsRegistry>) {
        let log: CallLog = Arc::default();
        let metrics = Arc::new(MetricsRegistry::for_sources(["wiki"]));
        let downloads = FakeDownloads {
            remote: s.remote.map(remote),
            local: s.local.map(|name| PathBuf::from("data/wiki").join(name)),
            stored: s.stored.map(str::to_string),
            fail: s.fail_download,
            log: log.clone(),
        };
        let connector = ZimConnector::new(
            SourceConfig::new("wiki", "https://mirror.example.org/zim/"),
            Arc::new(FakeMetadata(s.stored.map(str::to_string))),
            Arc::new(downloads),
            Box::new(FakeBackups {
                fail: s.fail_backup,
                log: log.clone(),
            }),
            Box::new(FakeVerifier {
                fail: s.fail_verify,
                log: log.clone(),
            }),
            metrics.clone(),
        );
        (connector, log, metrics)
    }

    fn calls(log: &CallLog) -> Vec<&'static str> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_fresh_source_runs_every_step() {
        let (mut connector, log, metrics) = build(Scenario {
            remote: Some("wiki_2024-01.zim"),
            ..Default::default()
        });

        assert!(connector.update_if_needed(false).await);
        assert_eq!(calls(&log), vec!["backup", "download", "verify"]);
        assert_eq!(connector.state(), UpdateState::Done);
        assert_eq!(metrics.counter_value("wiki_check_count"), Some(1));
    }

    #[tokio::test]
    async fn test_no_remote_file_fails_check() {
        let (mut connector, log, _) = build(Scenario::default());

        let result = connector.run_update(false).await;
        assert!(matches!(result, Err(UpdateError::NoRemoteFile { .. })));
        assert_eq!(connector.state(), UpdateState::Failed);
        assert!(calls(&log).is_empty());
        assert!(!connector.update_if_needed(false).await);
    }

    #[tokio::test]
    async fn test_up_to_date_has_no_side_effects() {
        let (mut connector, log, metrics) = build(Scenario {
            remote: Some("wiki_2024-01.zim"),
            local: Some("wiki_2024-01.zim"),
            stored: Some("2024-01"),
            ..Default::default()
        });

        let outcome = connector.run_update(false).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::UpToDate { .. }));
        assert_eq!(connector.state(), UpdateState::UpToDate);
        assert!(calls(&log).is_empty());
        assert_eq!(metrics.counter_value("wiki_check_count"), Some(1));
    }

    #[tokio::test]
    async fn test_older_remote_with_empty_history_is_not_downloaded() {
        let (mut connector, log, _) = build(Scenario {
            remote: Some("wiki_2023-12.zim"),
            local: Some("wiki_2024-01.zim"),
            ..Default::default()
        });

        assert!(connector.update_if_needed(false).await);
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_check_reasons() {
        let (mut connector, _, _) = build(Scenario {
            remote: Some("wiki_2024-02.zim"),
            local: Some("wiki_2024-01.zim"),
            stored: Some("2024-01"),
            ..Default::default()
        });
        let check = connector.check_for_update(false).await.unwrap();
        assert_eq!(
            check,
            UpdateCheck::Available {
                remote: remote("wiki_2024-02.zim"),
                reason: UpdateReason::NewerVersion
            }
        );

        let (mut connector, _, _) = build(Scenario {
            remote: Some("wiki_2024-01.zim"),
            local: Some("wiki_2024-01.zim"),
            stored: Some("2024-01"),
            ..Default::default()
        });
        let check = connector.check_for_update(true).await.unwrap();
        assert!(matches!(
            check,
            UpdateCheck::Available {
                reason: UpdateReason::Forced,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_backup_failure_aborts_before_download() {
        let (mut connector, log, _) = build(Scenario {
            remote: Some("wiki_2024-02.zim"),
            local: Some("wiki_2024-01.zim"),
            stored: Some("2024-01"),
            fail_backup: true,
            ..Default::default()
        });

        let err = connector.run_update(false).await.unwrap_err();
        assert_eq!(err.stage(), "backing_up");
        assert_eq!(calls(&log), vec!["backup"]);
        assert_eq!(connector.state(), UpdateState::Failed);
    }

    #[tokio::test]
    async fn test_download_failure_skips_verification() {
        let (mut connector, log, _) = build(Scenario {
            remote: Some("wiki_2024-02.zim"),
            fail_download: true,
            ..Default::default()
        });

        let err = connector.run_update(false).await.unwrap_err();
        assert_eq!(err.stage(), "downloading");
        assert_eq!(calls(&log), vec!["backup", "download"]);
    }

    #[tokio::test]
    async fn test_verification_failure_is_reported() {
        let (mut connector, log, _) = build(Scenario {
            remote: Some("wiki_2024-02.zim"),
            fail_verify: true,
            ..Default::default()
        });

        assert!(!connector.update_if_needed(false).await);
        assert_eq!(calls(&log), vec!["backup", "download", "verify"]);
        assert_eq!(connector.state(), UpdateState::Failed);
    }
}
