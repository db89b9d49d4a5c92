//! Application constants for ZIM Archiver
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("ZIM-Archiver/", env!("CARGO_PKG_VERSION"));

    /// Timeout for fetching a remote directory listing
    pub const LISTING_TIMEOUT: Duration = Duration::from_secs(30);

    /// Timeout for a whole archive transfer (archives can be multi-gigabyte)
    pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// Retry configuration for listing requests
pub mod limits {
    use super::Duration;

    /// Maximum retry attempts for failed listing requests
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
}

/// Remote source defaults, matching the public Kiwix mirror layout
pub mod sources {
    /// Default listing URL when a source does not name one
    pub const DEFAULT_SOURCE_URL: &str = "https://download.kiwix.org/zim/";

    /// Default filename pattern: any archive carrying a `_YYYY-MM` version token
    pub const DEFAULT_FILE_PATTERN: &str = r".*_[0-9]{4}-[0-9]{2}\.zim";

    /// Default number of backups retained per source
    pub const DEFAULT_MAX_BACKUPS: usize = 3;

    /// Name used when a source section does not declare one
    pub const DEFAULT_SOURCE_NAME: &str = "zim";
}

/// File operation constants
pub mod files {
    /// Suffix of in-progress downloads, promoted by atomic rename on success
    pub const TEMP_FILE_SUFFIX: &str = ".downloading";

    /// Expected archive extension (without the dot)
    pub const ARCHIVE_EXTENSION: &str = "zim";

    /// Marker placed between the archive stem and the backup timestamp
    pub const BACKUP_MARKER: &str = "_backup_";

    /// Timestamp layout of backup filenames (second resolution)
    pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

    /// Name of the per-data-directory metadata store
    pub const METADATA_FILE_NAME: &str = "downloads_metadata.json";

    /// Download chunk size for streaming (1 MiB)
    pub const DOWNLOAD_CHUNK_SIZE: usize = 1024 * 1024;

    /// Progress is reported every time this many bytes have been written (100 MiB)
    pub const PROGRESS_INTERVAL_BYTES: u64 = 100 * DOWNLOAD_CHUNK_SIZE as u64;
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";

    /// Default directory for log files
    pub const DEFAULT_LOG_DIR: &str = "logs";

    /// Log file name inside the log directory
    pub const LOG_FILE_NAME: &str = "zim_archiver.log";

    /// Log file rotation size (10MB)
    pub const LOG_ROTATION_SIZE: u64 = 10 * 1024 * 1024;

    /// Maximum rotated log files to keep
    pub const MAX_LOG_FILES: usize = 5;
}

/// Configuration file discovery
pub mod config {
    /// Directory name under the user/system config directory
    pub const APP_DIR_NAME: &str = "zim-archiver";

    /// Project-local configuration file name
    pub const LOCAL_CONFIG_FILE: &str = "zim-archiver.toml";
}

// Re-export commonly used constants for convenience
pub use files::{METADATA_FILE_NAME, TEMP_FILE_SUFFIX};
pub use http::USER_AGENT;
