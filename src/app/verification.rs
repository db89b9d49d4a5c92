//! Post-download sanity checks
//!
//! Verification is shallow: the archive must exist and be non-empty. An
//! unexpected extension is reported but accepted.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::constants::files;
use crate::errors::{VerificationError, VerificationResult};

/// Integrity check of a freshly downloaded archive
#[async_trait]
pub trait VerificationService: Send + Sync {
    /// Check `path`; returns the verified size in bytes
    async fn verify(&self, path: &Path) -> VerificationResult<u64>;
}

/// Verification for ZIM archives
#[derive(Debug, Clone, Default)]
pub struct ZimVerificationService;

impl ZimVerificationService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VerificationService for ZimVerificationService {
    async fn verify(&self, path: &Path) -> VerificationResult<u64> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VerificationError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(VerificationError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if metadata.len() == 0 {
            return Err(VerificationError::Empty {
                path: path.to_path_buf(),
            });
        }

        let has_archive_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(files::ARCHIVE_EXTENSION));
        if !has_archive_extension {
            warn!("File does not have .{} extension: {}", files::ARCHIVE_EXTENSION, path.display());
        }

        info!("Verified {} ({} bytes)", path.display(), metadata.len());
        Ok(metadata.len())
    }
}
