//! Logging setup
//!
//! Console output plus an optional plain-text log file under the log
//! directory. The file is rotated by size once at start-up, keeping a fixed
//! number of numbered predecessors (`zim_archiver.log.1` is the newest).

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::constants::logging;
use crate::errors::{AppError, Result};

/// Resolved logging options
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Level directive for this crate (`info`, `debug`, ...)
    pub level: String,
    /// Directory of the log file; `None` disables file logging
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
            log_dir: Some(PathBuf::from(logging::DEFAULT_LOG_DIR)),
        }
    }
}

/// Install the global subscriber; returns the log file path when file logging is on
///
/// # Errors
///
/// Returns `AppError` if the log file cannot be opened, the level is not a
/// valid directive, or a subscriber is already installed
pub fn init_logging(options: &LoggingOptions) -> Result<Option<PathBuf>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&options.level, rust_log.as_deref())?;

    let console_layer = fmt::layer().with_target(false);

    let (file_layer, log_path) = match &options.log_dir {
        Some(dir) => {
            let path = dir.join(logging::LOG_FILE_NAME);
            let file = open_log_file(&path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::generic(format!("Failed to initialise logging: {}", e)))?;

    Ok(log_path)
}

/// Filter from a non-empty `RUST_LOG`, otherwise `<crate>=<level>`
fn build_filter(level: &str, rust_log: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|value| !value.trim().is_empty()) {
        return Ok(EnvFilter::new(directives));
    }

    let directive: Directive = format!("{}={}", env!("CARGO_CRATE_NAME"), level)
        .parse()
        .map_err(|e| AppError::generic(format!("Invalid log level {}: {}", level, e)))?;
    Ok(EnvFilter::default().add_directive(directive))
}

fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    rotate_logs(path, logging::LOG_ROTATION_SIZE, logging::MAX_LOG_FILES)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// Rotate `path` if it is larger than `max_size`, keeping `keep` old files
///
/// Returns whether a rotation happened.
pub fn rotate_logs(path: &Path, max_size: u64, keep: usize) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size <= max_size {
        return Ok(false);
    }
    if keep == 0 {
        fs::remove_file(path)?;
        return Ok(true);
    }

    let numbered = |n: usize| {
        let mut raw = path.as_os_str().to_owned();
        raw.push(format!(".{}", n));
        PathBuf::from(raw)
    };

    let oldest = numbered(keep);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..keep).rev() {
        let from = numbered(n);
        if from.exists() {
            fs::rename(&from, numbered(n + 1))?;
        }
    }
    fs::rename(path, numbered(1))?;
    Ok(true)
}
