//! Command-line argument parsing for ZIM Archiver
//!
//! This module defines the CLI structure using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// ZIM Archiver - keep local copies of published ZIM archives current
#[derive(Parser, Debug)]
#[command(
    name = "zim_archiver",
    version,
    about = "Download newer ZIM archives, rotating backups of the previous ones",
    long_about = "Checks each configured archive source for a newer dated release, backs up the current
archive, downloads the new one atomically and records the download history."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for the log file
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Log to the console only
    #[arg(long, global = true)]
    pub no_log_file: bool,

    /// Write Prometheus metrics to this file after the run
    #[arg(long, global = true, value_name = "FILE")]
    pub metrics_file: Option<PathBuf>,
}

/// Log verbosity
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download newer archives for one or all sources
    Update(UpdateArgs),

    /// Report whether newer archives are available without downloading
    Check(UpdateArgs),

    /// Show recorded download history
    Status(StatusArgs),

    /// List configured sources
    Sources,
}

/// Arguments for the update and check commands
#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Only this source (default: every configured source)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Download the latest remote archive even if it is not newer
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the status command
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Only this source
    #[arg(short, long)]
    pub source: Option<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level from the flag, falling back to the configured one
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        self.global.log_level.map_or(configured, |level| level.as_str())
    }

    /// Log directory, or `None` when file logging is disabled
    ///
    /// `--log-dir` wins over the configured directory; `--no-log-file` wins
    /// over both.
    pub fn log_dir(&self, configured: Option<PathBuf>) -> Option<PathBuf> {
        if self.global.no_log_file {
            return None;
        }
        self.global.log_dir.clone().or(configured)
    }
}
