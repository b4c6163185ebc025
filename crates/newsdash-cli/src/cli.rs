//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use newsdash_core::Framing;

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(name = "newsdash", author, version, about = "Live newsroom dashboard client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend endpoint, e.g. http://localhost:5000
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// Wire framing: socketio or json
    #[arg(long, global = true)]
    pub framing: Option<Framing>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Stream every dashboard version until Ctrl-C
    Watch {
        /// Print each version as one JSON line
        #[arg(long)]
        json: bool,
    },
    /// Wait for the first stats snapshot, print the dashboard as JSON and exit
    Snapshot {
        /// Give up after this many seconds
        #[arg(short, long, default_value_t = 10)]
        wait_secs: u64,
    },
    /// Connect, emit one event and exit
    Send {
        /// Event name, e.g. request_stats
        event: String,
        /// JSON payload (defaults to null)
        payload: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

impl Cli {
    /// Flags that take precedence over every configuration source
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config_file: self.config.clone(),
            endpoint: self.endpoint.clone(),
            framing: self.framing,
            verbose: self.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "newsdash",
            "watch",
            "--json",
            "--endpoint",
            "http://feed:5000",
            "--framing",
            "json",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.command, Commands::Watch { json: true });
        let overrides = cli.overrides();
        assert_eq!(overrides.endpoint.as_deref(), Some("http://feed:5000"));
        assert_eq!(overrides.framing, Some(Framing::Json));
        assert!(overrides.verbose);
    }

    #[test]
    fn test_parse_send_and_snapshot() {
        let cli = Cli::try_parse_from(["newsdash", "send", "request_stats"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Send {
                event: "request_stats".to_string(),
                payload: None
            }
        );

        let cli = Cli::try_parse_from(["newsdash", "snapshot"]).unwrap();
        assert_eq!(cli.command, Commands::Snapshot { wait_secs: 10 });
    }

    #[test]
    fn test_rejects_unknown_framing() {
        assert!(Cli::try_parse_from(["newsdash", "--framing", "xml", "watch"]).is_err());
    }
}
