//! Assembly of connectors from source configuration

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::app::backup::ZimBackupManager;
use crate::app::client::ArchiveClient;
use crate::app::connector::ZimConnector;
use crate::app::download::{DownloadManager, ZimDownloadManager};
use crate::app::index::ArchiveIndex;
use crate::app::metadata::{JsonMetadataStore, MetadataManager};
use crate::app::models::SourceConfig;
use crate::app::verification::ZimVerificationService;
use crate::config::{source_from_prefix, ConfigLookup};
use crate::errors::{ConfigError, ConfigResult};
use crate::metrics::MetricsRegistry;

/// Builds the ZIM component set for a source
pub struct ZimFactory;

impl ZimFactory {
    /// Create a connector for a typed source configuration
    ///
    /// The data and backup directories are created if missing.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the source is invalid or a directory cannot be created
    pub fn create_connector_from_config(
        source: &SourceConfig,
        client: ArchiveClient,
        metrics: Arc<MetricsRegistry>,
    ) -> ConfigResult<ZimConnector> {
        source.validate()?;
        let data_dir = source.data_dir();
        let backup_dir = source.backup_dir();
        ensure_dir(&data_dir)?;
        ensure_dir(&backup_dir)?;

        let metadata: Arc<dyn MetadataManager> =
            Arc::new(JsonMetadataStore::new(&source.name, &data_dir));
        let index = ArchiveIndex::new(client.clone(), source)?;
        let downloads: Arc<dyn DownloadManager> = Arc::new(ZimDownloadManager::new(
            &source.name,
            &data_dir,
            index,
            client,
            metadata.clone(),
            metrics.clone(),
        ));
        let backups = ZimBackupManager::new(
            &source.name,
            &backup_dir,
            source.max_backups,
            downloads.clone(),
            metrics.clone(),
        );

        debug!(
            "Created connector for {} (data {}, backups {})",
            source.name,
            data_dir.display(),
            backup_dir.display()
        );
        Ok(ZimConnector::new(
            source.clone(),
            metadata,
            downloads,
            Box::new(backups),
            Box::new(ZimVerificationService::new()),
            metrics,
        ))
    }

    /// Create a connector from `<prefix>.<key>` entries of a configuration lookup
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the resolved source is invalid or a directory
    /// cannot be created
    pub fn create_connector<L: ConfigLookup>(
        lookup: &L,
        source_name: &str,
        prefix: &str,
        client: ArchiveClient,
        metrics: Arc<MetricsRegistry>,
    ) -> ConfigResult<ZimConnector> {
        let source = source_from_prefix(lookup, source_name, prefix);
        Self::create_connector_from_config(&source, client, metrics)
    }
}

fn ensure_dir(path: &Path) -> ConfigResult<()> {
    std::fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
