//! Error types for ZIM Archiver
//!
//! Every component reports failure through one of these enums instead of
//! panicking. Errors are designed to be actionable and provide clear context
//! for the per-step log lines the update protocol emits.

use std::path::PathBuf;
use thiserror::Error;

/// Remote listing and local index errors
#[derive(Error, Debug)]
pub enum IndexError {
    /// HTTP request failed
    #[error("Listing request failed")]
    Http(#[from] reqwest::Error),

    /// Server returned error status
    #[error("Listing server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Server overloaded
    #[error("Server overloaded. Server responded with HTTP 503")]
    ServerOverloaded,

    /// Maximum retries exceeded
    #[error("Maximum retry attempts ({max_retries}) exceeded for listing request")]
    MaxRetriesExceeded { max_retries: u32 },

    /// Local directory scan failed
    #[error("Failed to scan directory: {path}")]
    DirectoryScan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Download and HTTP client errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),

    /// Server returned error status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// Incomplete download
    #[error("Incomplete download: received {received} bytes, expected {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// The archive landed but its history could not be recorded
    #[error("Download metadata could not be recorded")]
    Metadata(#[from] MetadataError),
}

/// Metadata store errors
#[derive(Error, Debug)]
pub enum MetadataError {
    /// I/O error reading or writing the store
    #[error("Metadata I/O error: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("Metadata serialization failed")]
    Json(#[from] serde_json::Error),

    /// Filename does not embed a `_YYYY-MM.` version token
    #[error("Could not extract version from filename: {filename}")]
    MissingVersion { filename: String },
}

/// Backup management errors
#[derive(Error, Debug)]
pub enum BackupError {
    /// Backup directory not found or inaccessible
    #[error("Backup directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Copy or removal failed
    #[error("Backup I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Copied size differs from the source
    #[error("Backup size mismatch. Expected: {expected} bytes, got: {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// Post-download verification errors
#[derive(Error, Debug)]
pub enum VerificationError {
    /// Downloaded file does not exist
    #[error("File does not exist: {path}")]
    NotFound { path: PathBuf },

    /// Downloaded file is empty
    #[error("File is empty: {path}")]
    Empty { path: PathBuf },

    /// Metadata could not be read
    #[error("Could not inspect {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// No configuration file in any standard location
    #[error("No configuration file found. Pass --config or create {hint}")]
    NoConfigFile { hint: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid TOML
    #[error("Invalid TOML configuration")]
    InvalidToml(#[from] toml::de::Error),

    /// Invalid JSON
    #[error("Invalid JSON configuration")]
    InvalidJson(#[from] serde_json::Error),

    /// Missing required configuration field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Requested source is not configured
    #[error("Unknown source: {name}")]
    UnknownSource { name: String },

    /// Source or backup directory could not be created
    #[error("Failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client could not be built
    #[error("Failed to build HTTP client")]
    HttpClient(#[from] reqwest::Error),
}

/// Failure of one source's update, tagged with the protocol stage
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The remote listing yielded no matching archive
    #[error("No matching files found on server for {source_name}")]
    NoRemoteFile { source_name: String },

    /// Backup of the current archive failed; nothing was downloaded
    #[error("Backup failed, update aborted")]
    Backup(#[from] BackupError),

    /// Download failed; the previous archive and its backup are untouched
    #[error("Download failed")]
    Download(#[from] DownloadError),

    /// Downloaded archive failed verification and is left in place
    #[error("Verification failed")]
    Verification(#[from] VerificationError),
}

impl UpdateError {
    /// Protocol stage at which the update stopped
    pub fn stage(&self) -> &'static str {
        match self {
            UpdateError::NoRemoteFile { .. } => "checking",
            UpdateError::Backup(_) => "backing_up",
            UpdateError::Download(_) => "downloading",
            UpdateError::Verification(_) => "verifying",
        }
    }
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Listing error
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Metadata error
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Backup error
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Verification error
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Update error
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Index(IndexError::Http(_))
                | AppError::Index(IndexError::RateLimitExceeded)
                | AppError::Index(IndexError::ServerOverloaded)
                | AppError::Index(IndexError::MaxRetriesExceeded { .. })
                | AppError::Download(DownloadError::Http(_))
                | AppError::Download(DownloadError::IncompleteDownload { .. })
                | AppError::Update(UpdateError::NoRemoteFile { .. })
                | AppError::Update(UpdateError::Download(DownloadError::Http(_)))
        )
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Index(_) => "index",
            AppError::Download(_) => "download",
            AppError::Metadata(_) => "metadata",
            AppError::Backup(_) => "backup",
            AppError::Verification(_) => "verification",
            AppError::Config(_) => "config",
            AppError::Update(_) => "update",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Listing result type alias
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Metadata result type alias
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Backup result type alias
pub type BackupResult<T> = std::result::Result<T, BackupError>;

/// Verification result type alias
pub type VerificationResult<T> = std::result::Result<T, VerificationError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Update result type alias
pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = AppError::Config(ConfigError::UnknownSource {
            name: "missing".to_string(),
        });
        assert_eq!(err.category(), "config");
        assert!(!err.is_recoverable());

        let err = AppError::Index(IndexError::RateLimitExceeded);
        assert_eq!(err.category(), "index");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_update_error_stage() {
        let err = UpdateError::from(BackupError::SizeMismatch {
            expected: 10,
            actual: 4,
        });
        assert_eq!(err.stage(), "backing_up");

        let err = UpdateError::from(VerificationError::Empty {
            path: PathBuf::from("a.zim"),
        });
        assert_eq!(err.stage(), "verifying");

        let err = UpdateError::NoRemoteFile {
            source_name: "wiki".to_string(),
        };
        assert_eq!(err.stage(), "checking");
        assert!(err.to_string().contains("wiki"));
    }

    #[test]
    fn test_metadata_error_bubbles_into_download_error() {
        let err = DownloadError::from(MetadataError::MissingVersion {
            filename: "plain.zim".to_string(),
        });
        assert!(matches!(err, DownloadError::Metadata(_)));
    }
}
