//! ZIM Archiver CLI application
//!
//! Command-line interface for keeping local ZIM archives current.

use std::path::PathBuf;
use std::process;

use tracing::{error, info};

use zim_archiver::cli::{handle_check, handle_sources, handle_status, handle_update, Cli, Commands};
use zim_archiver::config::AppConfig;
use zim_archiver::constants::logging as log_constants;
use zim_archiver::errors::Result;
use zim_archiver::logging::{init_logging, LoggingOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse_args();

    let code = match tokio::spawn(run(cli)).await {
        Ok(Ok(true)) => 0,
        Ok(Ok(false)) => 1,
        Ok(Err(e)) => {
            error!(category = e.category(), "{}", error_chain(&e));
            eprintln!("Error: {}", error_chain(&e));
            1
        }
        Err(e) => {
            error!("Unexpected failure: {}", e);
            eprintln!("Unexpected failure: {}", e);
            1
        }
    };
    process::exit(code);
}

/// Main application logic; returns whether every requested operation succeeded
async fn run(cli: Cli) -> Result<bool> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let config = AppConfig::load(cli.global.config.clone()).await;

    // Logging comes up even when the configuration is unusable, so the error gets logged
    let (level, configured_dir) = match &config {
        Ok(config) => (
            config.logging.level.clone(),
            config
                .logging
                .file_logging
                .then(|| config.logging.log_dir.clone()),
        ),
        Err(_) => (
            log_constants::DEFAULT_LOG_LEVEL.to_string(),
            Some(PathBuf::from(log_constants::DEFAULT_LOG_DIR)),
        ),
    };
    let options = LoggingOptions {
        level: cli.log_level(&level).to_string(),
        log_dir: cli.log_dir(configured_dir),
    };
    let log_path = init_logging(&options)?;

    info!("ZIM Archiver v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(path) = log_path {
        info!("Logging to {}", path.display());
    }

    let config = config?;
    if let Some(path) = config.store.path() {
        info!("Using configuration {}", path.display());
    }
    let metrics_file = cli
        .global
        .metrics_file
        .clone()
        .or_else(|| config.metrics.textfile.clone());

    match cli.command {
        Commands::Update(args) => {
            info!("Executing update command");
            handle_update(&config, args, metrics_file.as_deref()).await
        }
        Commands::Check(args) => {
            info!("Executing check command");
            handle_check(&config, args, metrics_file.as_deref()).await
        }
        Commands::Status(args) => handle_status(&config, args).await,
        Commands::Sources => handle_sources(&config),
    }
}

/// Display an error with its chain of causes
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
