//! Nearcast CLI library
//!
//! Argument parsing, configuration and command handlers behind the
//! `nearcast` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod simulate;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
