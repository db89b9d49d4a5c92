//! ZIM Archiver Library
//!
//! Keeps local copies of dated ZIM archives current: finds the newest release
//! on a mirror listing, backs up the archive it replaces, downloads the new
//! one atomically and records the download history per source.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod metrics;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
