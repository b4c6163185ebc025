//! newsdash CLI library
//!
//! Command-line front end for the live dashboard: argument parsing, layered
//! configuration, and the `watch` / `snapshot` / `send` / `config` commands
//! built on `newsdash_sync::DashboardSession`.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::{AppConfig, CliConfig, Overrides};
pub use error::{CliError, Result};
