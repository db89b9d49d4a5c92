//! Command handlers for ZIM Archiver CLI
//!
//! This module implements the command handlers that coordinate between CLI
//! arguments and the update protocol. Sources are processed one after another.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::{
    ArchiveClient, JsonMetadataStore, MetadataManager, SourceConfig, SourceConnector,
    UpdateCheck, ZimFactory,
};
use crate::cli::{StatusArgs, UpdateArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, ConfigError, Result};
use crate::metrics::MetricsRegistry;

/// Resolve one named source or every configured source
fn select_sources(config: &AppConfig, name: Option<&str>) -> Result<Vec<SourceConfig>> {
    if let Some(name) = name {
        return Ok(vec![config.resolve_source(name)?]);
    }
    if config.sources.is_empty() {
        return Err(ConfigError::MissingField {
            field: "sources".to_string(),
        }
        .into());
    }
    Ok(config.sources.clone())
}

fn build_client(config: &AppConfig) -> Result<ArchiveClient> {
    Ok(ArchiveClient::with_config(config.http.to_runtime_config())?)
}

async fn write_metrics(metrics: &MetricsRegistry, path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    match metrics.write_textfile(path).await {
        Ok(()) => info!("Wrote metrics to {}", path.display()),
        Err(e) => warn!("Could not write metrics to {}: {}", path.display(), e),
    }
}

/// Handle the update command
///
/// Every selected source is attempted; the result is true only if all of
/// them succeeded.
pub async fn handle_update(
    config: &AppConfig,
    args: UpdateArgs,
    metrics_file: Option<&Path>,
) -> Result<bool> {
    let sources = select_sources(config, args.source.as_deref())?;
    let client = build_client(config)?;
    let metrics = Arc::new(MetricsRegistry::for_sources(sources.iter().map(|s| &s.name)));

    info!("Updating {} source(s)", sources.len());
    let mut all_ok = true;
    for source in &sources {
        let mut connector =
            match ZimFactory::create_connector_from_config(source, client.clone(), metrics.clone()) {
                Ok(connector) => connector,
                Err(e) => {
                    error!("Could not set up source {}: {}", source.name, e);
                    all_ok = false;
                    continue;
                }
            };

        let ok = connector.update_if_needed(args.force).await;
        println!(
            "{}: {}",
            source.name,
            if ok { "ok" } else { "failed" }
        );
        all_ok &= ok;
    }

    write_metrics(&metrics, metrics_file).await;
    if all_ok {
        info!("All sources processed successfully");
    } else {
        warn!("One or more sources failed");
    }
    Ok(all_ok)
}

/// Handle the check command
pub async fn handle_check(
    config: &AppConfig,
    args: UpdateArgs,
    metrics_file: Option<&Path>,
) -> Result<bool> {
    let sources = select_sources(config, args.source.as_deref())?;
    let client = build_client(config)?;
    let metrics = Arc::new(MetricsRegistry::for_sources(sources.iter().map(|s| &s.name)));

    let mut all_ok = true;
    for source in &sources {
        let mut connector =
            match ZimFactory::create_connector_from_config(source, client.clone(), metrics.clone()) {
                Ok(connector) => connector,
                Err(e) => {
                    error!("Could not set up source {}: {}", source.name, e);
                    all_ok = false;
                    continue;
                }
            };

        match connector.check_for_update(args.force).await {
            Ok(UpdateCheck::UpToDate { remote }) => {
                println!("{}: up to date ({})", source.name, remote.filename);
            }
            Ok(UpdateCheck::Available { remote, reason }) => {
                println!(
                    "{}: update available: {} ({})",
                    source.name, remote.filename, reason
                );
            }
            Err(e) => {
                println!("{}: check failed: {}", source.name, e);
                all_ok = false;
            }
        }
    }

    write_metrics(&metrics, metrics_file).await;
    Ok(all_ok)
}

/// Handle the status command
///
/// Reads the metadata store directly; nothing is created on disk.
pub async fn handle_status(config: &AppConfig, args: StatusArgs) -> Result<bool> {
    let sources = select_sources(config, args.source.as_deref())?;

    for source in &sources {
        let store = JsonMetadataStore::new(&source.name, &source.data_dir());
        println!("{}", source.name);
        match store.source_metadata().await {
            Some(metadata) if !metadata.downloads.is_empty() => {
                println!(
                    "  Latest version: {}",
                    metadata.latest_version.as_deref().unwrap_or("unknown")
                );
                if let Some(date) = &metadata.latest_download_date {
                    println!("  Last download:  {}", date);
                }
                println!("  History:");
                for record in &metadata.downloads {
                    println!(
                        "    {}  {}  {:.2} MB  {}",
                        record.version,
                        record.filename,
                        record.size_bytes as f64 / (1024.0 * 1024.0),
                        record.download_date
                    );
                }
            }
            _ => println!("  No downloads recorded"),
        }
    }
    Ok(true)
}

/// Handle the sources command
pub fn handle_sources(config: &AppConfig) -> Result<bool> {
    if config.sources.is_empty() {
        return Err(AppError::generic("No sources configured"));
    }
    for source in &config.sources {
        println!("{}", source.name);
        println!("  URL:         {}", source.source_url);
        println!("  Pattern:     {}", source.file_pattern);
        println!("  Data dir:    {}", source.data_dir().display());
        println!("  Backup dir:  {}", source.backup_dir().display());
        println!("  Max backups: {}", source.max_backups);
    }
    Ok(true)
}
