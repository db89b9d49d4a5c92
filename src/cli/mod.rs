//! Command-line interface components
//!
//! This module contains CLI-specific code for the ZIM Archiver application:
//! argument parsing and the command handlers.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, GlobalArgs, LogLevel, StatusArgs, UpdateArgs};
pub use commands::{handle_check, handle_sources, handle_status, handle_update};
