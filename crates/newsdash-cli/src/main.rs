//! newsdash CLI - live dashboard client entry point

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error};

use newsdash_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration; flags win over files and environment
    let config = AppConfig::load(&cli.overrides()).context("Failed to load configuration")?;

    // Initialize logging
    setup_logging(config.cli.verbose);
    debug!(?config, "Effective configuration");

    // Execute the command
    if let Err(e) = CommandDispatcher::execute(cli.command, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level. Logs go to stderr so command
/// output on stdout stays machine-readable.
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
