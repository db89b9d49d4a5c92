//! Integration tests for the update protocol
//!
//! These tests drive a real connector, assembled by the factory, against the
//! in-process HTTP fixture in `server.rs`.

mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use server::{Route, TestServer};
use zim_archiver::app::{
    ArchiveClient, ClientConfig, JsonMetadataStore, MetadataManager, SourceConfig,
    SourceConnector, UpdateCheck, UpdateState, ZimConnector, ZimFactory,
};
use zim_archiver::errors::UpdateError;
use zim_archiver::metrics::MetricsRegistry;

const PATTERN: &str = r"wiki_[0-9]{4}-[0-9]{2}\.zim";

/// Archive body spanning several download chunks
fn archive_body(seed: u8) -> Vec<u8> {
    (0..(2 * 1024 * 1024 + 12_345))
        .map(|i| (i % 251) as u8 ^ seed)
        .collect()
}

struct Fixture {
    server: TestServer,
    root: TempDir,
    metrics: Arc<MetricsRegistry>,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            server: TestServer::start().await,
            root: TempDir::new().unwrap(),
            metrics: Arc::new(MetricsRegistry::for_sources(["wiki"])),
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    fn backup_dir(&self) -> PathBuf {
        self.root.path().join("backup")
    }

    fn source(&self) -> SourceConfig {
        SourceConfig::new("wiki", self.server.url("/zim/"))
            .with_file_pattern(PATTERN)
            .with_storage_path(self.data_dir())
            .with_backup_path(self.backup_dir())
    }

    fn connector_for(&self, source: &SourceConfig) -> ZimConnector {
        let config = ClientConfig {
            max_retries: 0,
            listing_timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let client = ArchiveClient::with_config(config).unwrap();
        ZimFactory::create_connector_from_config(source, client, self.metrics.clone()).unwrap()
    }

    fn connector(&self) -> ZimConnector {
        self.connector_for(&self.source())
    }

    /// Publish `files` on the listing, each with its own body
    fn publish(&self, files: &[&str]) {
        self.server.set_listing("/zim/", files);
        for (i, name) in files.iter().enumerate() {
            self.server
                .set_file(&format!("/zim/{}", name), archive_body(i as u8 + 1));
        }
    }

    fn store(&self) -> JsonMetadataStore {
        JsonMetadataStore::new("wiki", &self.data_dir())
    }

    fn counter(&self, suffix: &str) -> u64 {
        self.metrics
            .counter_value(&format!("wiki_{}", suffix))
            .unwrap()
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_fresh_download() {
    let fixture = Fixture::new().await;
    fixture.publish(&["wiki_2024-01.zim"]);
    let mut connector = fixture.connector();

    assert!(connector.update_if_needed(false).await);
    assert_eq!(connector.state(), UpdateState::Done);

    let final_path = fixture.data_dir().join("wiki_2024-01.zim");
    assert_eq!(std::fs::read(&final_path).unwrap(), archive_body(1));
    assert_eq!(
        file_names(&fixture.data_dir()),
        vec!["downloads_metadata.json", "wiki_2024-01.zim"]
    );
    // Nothing existed to back up
    assert!(file_names(&fixture.backup_dir()).is_empty());

    let metadata = fixture.store().source_metadata().await.unwrap();
    assert_eq!(metadata.downloads.len(), 1);
    assert_eq!(metadata.downloads[0].version, "2024-01");
    assert_eq!(metadata.downloads[0].size_bytes, archive_body(1).len() as u64);
    assert_eq!(fixture.store().latest_version().await.as_deref(), Some("2024-01"));

    assert_eq!(fixture.counter("check_count"), 1);
    assert_eq!(fixture.counter("download_count"), 1);
    assert_eq!(fixture.counter("download_failures"), 0);
    assert_eq!(
        fixture
            .metrics
            .gauge_value("wiki_last_download_size_bytes"),
        Some(archive_body(1).len() as f64)
    );
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let fixture = Fixture::new().await;
    fixture.publish(&["wiki_2024-01.zim"]);
    let mut connector = fixture.connector();

    assert!(connector.update_if_needed(false).await);
    assert!(connector.update_if_needed(false).await);

    assert_eq!(connector.state(), UpdateState::UpToDate);
    assert_eq!(fixture.server.hits("/zim/wiki_2024-01.zim"), 1);
    assert_eq!(fixture.counter("download_count"), 1);
    assert_eq!(fixture.counter("check_count"), 2);
    assert!(file_names(&fixture.backup_dir()).is_empty());
}

#[tokio::test]
async fn test_newer_release_backs_up_and_replaces() {
    let fixture = Fixture::new().await;
    fixture.publish(&["wiki_2024-01.zim"]);
    let mut connector = fixture.connector();
    assert!(connector.update_if_needed(false).await);

    fixture.publish(&["wiki_2024-01.zim", "wiki_2024-02.zim"]);
    assert!(connector.update_if_needed(false).await);

    let backups = file_names(&fixture.backup_dir());
    assert_eq!(backups.len(), 1);
    assert!(backups[0].starts_with("wiki_2024-01_backup_"));
    assert_eq!(
        std::fs::read(fixture.backup_dir().join(&backups[0])).unwrap(),
        archive_body(1)
    );
    assert_eq!(
        std::fs::read(fixture.data_dir().join("wiki_2024-02.zim")).unwrap(),
        archive_body(2)
    );

    let metadata = fixture.store().source_metadata().await.unwrap();
    assert_eq!(metadata.downloads.len(), 2);
    assert_eq!(metadata.latest_version.as_deref(), Some("2024-02"));
    assert_eq!(fixture.counter("backup_count"), 1);
}

#[tokio::test]
async fn test_older_remote_is_not_downloaded() {
    let fixture = Fixture::new().await;
    fixture.publish(&["wiki_2023-12.zim"]);
    let mut connector = fixture.connector();
    std::fs::write(fixture.data_dir().join("wiki_2024-01.zim"), b"current archive").unwrap();

    assert!(connector.update_if_needed(false).await);

    assert_eq!(fixture.server.hits("/zim/wiki_2023-12.zim"), 0);
    assert_eq!(file_names(&fixture.data_dir()), vec!["wiki_2024-01.zim"]);
}

#[tokio::test]
async fn test_latest_is_lexicographic_maximum() {
    let fixture = Fixture::new().await;
    fixture.publish(&[
        "wiki_2023-11.zim",
        "wiki_2024-03.zim",
        "wiki_2023-12.zim",
        "wiki_2024-01.zim",
    ]);
    let mut connector = fixture.connector();

    let check = connector.check_for_update(false).await.unwrap();
    assert_eq!(check.remote().filename, "wiki_2024-03.zim");
    assert!(check.is_available());

    assert!(connector.update_if_needed(false).await);
    assert!(fixture.data_dir().join("wiki_2024-03.zim").exists());
    assert_eq!(fixture.server.hits("/zim/wiki_2023-12.zim"), 0);
}

#[tokio::test]
async fn test_empty_listing_fails_the_check() {
    let fixture = Fixture::new().await;
    fixture.publish(&[]);
    let mut connector = fixture.connector();

    let result = connector.check_for_update(false).await;
    assert!(matches!(result, Err(UpdateError::NoRemoteFile { .. })));
    assert!(!connector.update_if_needed(false).await);
    assert_eq!(connector.state(), UpdateState::Failed);
}

#[tokio::test]
async fn test_unreachable_listing_fails_without_side_effects() {
    let fixture = Fixture::new().await;
    fixture.server.set_route("/zim/", Route::Status(503));
    let mut connector = fixture.connector();

    let result = connector.check_for_update(false).await;
    assert!(matches!(result, Err(UpdateError::NoRemoteFile { .. })));
    assert!(!connector.update_if_needed(false).await);
    assert!(file_names(&fixture.data_dir()).is_empty());
}

#[tokio::test]
async fn test_truncated_download_leaves_no_files() {
    let fixture = Fixture::new().await;
    fixture.server.set_listing("/zim/", &["wiki_2024-01.zim"]);
    let body = archive_body(1);
    fixture.server.set_route(
        "/zim/wiki_2024-01.zim",
        Route::Truncated {
            declared: body.len(),
            body: body[..body.len() / 2].to_vec(),
        },
    );
    let mut connector = fixture.connector();

    assert!(!connector.update_if_needed(false).await);

    assert!(file_names(&fixture.data_dir()).is_empty());
    assert!(fixture.store().source_metadata().await.is_none());
    assert_eq!(fixture.counter("download_failures"), 1);
    assert_eq!(fixture.counter("download_count"), 0);
}

#[tokio::test]
async fn test_missing_archive_keeps_previous_version_and_backup() {
    let fixture = Fixture::new().await;
    fixture.publish(&["wiki_2024-01.zim"]);
    let mut connector = fixture.connector();
    assert!(connector.update_if_needed(false).await);

    // Listed but not served
    fixture
        .server
        .set_listing("/zim/", &["wiki_2024-01.zim", "wiki_2024-02.zim"]);
    fixture
        .server
        .set_route("/zim/wiki_2024-02.zim", Route::Status(404));

    assert!(!connector.update_if_needed(false).await);

    assert_eq!(
        file_names(&fixture.data_dir()),
        vec!["downloads_metadata.json", "wiki_2024-01.zim"]
    );
    assert_eq!(file_names(&fixture.backup_dir()).len(), 1);
    assert_eq!(fixture.store().latest_version().await.as_deref(), Some("2024-01"));
}

#[tokio::test]
async fn test_force_redownloads_current_release() {
    let fixture = Fixture::new().await;
    fixture.publish(&["wiki_2024-01.zim"]);
    let mut connector = fixture.connector();
    assert!(connector.update_if_needed(false).await);

    assert!(matches!(
        connector.check_for_update(false).await.unwrap(),
        UpdateCheck::UpToDate { .. }
    ));
    assert!(connector.update_if_needed(true).await);

    assert_eq!(fixture.server.hits("/zim/wiki_2024-01.zim"), 2);
    assert_eq!(file_names(&fixture.backup_dir()).len(), 1);
    let metadata = fixture.store().source_metadata().await.unwrap();
    assert_eq!(metadata.downloads.len(), 2);
}

#[tokio::test]
async fn test_backup_retention_after_update() {
    let fixture = Fixture::new().await;
    let source = fixture.source().with_max_backups(2);
    let mut connector = fixture.connector_for(&source);

    for (name, age) in [
        ("wiki_2023-10_backup_20231101000000.zim", 300),
        ("wiki_2023-11_backup_20231201000000.zim", 200),
        ("wiki_2023-12_backup_20240101000000.zim", 100),
    ] {
        let path = fixture.backup_dir().join(name);
        std::fs::write(&path, b"old").unwrap();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age))
            .unwrap();
    }
    std::fs::write(fixture.data_dir().join("wiki_2024-01.zim"), b"current").unwrap();
    fixture.publish(&["wiki_2024-02.zim"]);

    assert!(connector.update_if_needed(false).await);

    let backups = file_names(&fixture.backup_dir());
    assert_eq!(backups.len(), 2);
    assert!(backups.contains(&"wiki_2023-12_backup_20240101000000.zim".to_string()));
    assert!(backups.iter().any(|name| name.starts_with("wiki_2024-01_backup_")));
}
