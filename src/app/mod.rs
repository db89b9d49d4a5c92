//! Core application logic for ZIM Archiver
//!
//! This module contains the update protocol components: the HTTP client, the
//! listing resolver, the metadata store, the download, backup and verification
//! managers, and the per-source connector that sequences them.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zim_archiver::app::{ArchiveClient, SourceConfig, SourceConnector, ZimFactory};
//! use zim_archiver::metrics::MetricsRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = SourceConfig::new("wikipedia", "https://download.kiwix.org/zim/wikipedia/")
//!     .with_file_pattern(r"wikipedia_en_all_maxi_[0-9]{4}-[0-9]{2}\.zim");
//! let metrics = Arc::new(MetricsRegistry::for_sources([&source.name]));
//!
//! let mut connector = ZimFactory::create_connector_from_config(&source, ArchiveClient::new()?, metrics)?;
//! if connector.update_if_needed(false).await {
//!     println!("{} is current", connector.source_name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod client;
pub mod connector;
pub mod download;
pub mod factory;
pub mod index;
pub mod metadata;
pub mod models;
pub mod verification;

// Re-export main public API
pub use backup::{BackupFile, BackupManager, BackupOutcome, ZimBackupManager};
pub use client::{ArchiveClient, ClientConfig};
pub use connector::{
    SourceConnector, UpdateCheck, UpdateOutcome, UpdateReason, UpdateState, ZimConnector,
};
pub use download::{DownloadManager, ZimDownloadManager};
pub use factory::ZimFactory;
pub use index::ArchiveIndex;
pub use metadata::{JsonMetadataStore, MetadataManager};
pub use models::{
    is_newer, ArchiveVersion, DownloadRecord, RemoteFile, SourceConfig, SourceMetadata,
};
pub use verification::{VerificationService, ZimVerificationService};
