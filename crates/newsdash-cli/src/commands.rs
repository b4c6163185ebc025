//! Command handlers for the newsdash CLI

use std::sync::Arc;
use std::time::Duration;

use newsdash_core::{ConnectionStatus, DashboardState};
use newsdash_sync::DashboardSession;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::Commands;
use crate::config::{AppConfig, CliConfig};
use crate::error::{CliError, Result};

/// Extra time granted on top of the connect timeout by one-shot commands
const CONNECT_GRACE: Duration = Duration::from_secs(1);

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Watch { json } => Self::handle_watch_command(config, json).await,
            Commands::Snapshot { wait_secs } => {
                Self::handle_snapshot_command(config, Duration::from_secs(wait_secs)).await
            }
            Commands::Send { event, payload } => {
                Self::handle_send_command(config, event, payload).await
            }
            Commands::Config => Self::handle_config_command(&config),
        }
    }

    /// Stream versions until Ctrl-C
    async fn handle_watch_command(config: AppConfig, json: bool) -> Result<()> {
        let session = DashboardSession::open(config.sync)?;
        info!(endpoint = %session.config().endpoint, "Watching dashboard; press Ctrl-C to stop");

        let cli = config.cli;
        let subscription = session.subscribe(move |state| {
            if json {
                match serde_json::to_string(&**state) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!(error = %e, "Failed to encode version"),
                }
            } else {
                println!("{}", render_summary(state, &cli));
            }
        });

        tokio::signal::ctrl_c().await?;

        subscription.unsubscribe();
        let stats = session.stats();
        session.close().await;
        info!(
            versions = stats.versions_published,
            dropped = stats.unknown_dropped + stats.malformed_dropped,
            "Watch finished"
        );
        Ok(())
    }

    /// Print the dashboard once the first stats snapshot has arrived
    async fn handle_snapshot_command(mut config: AppConfig, wait: Duration) -> Result<()> {
        config.sync.auto_reconnect = false;
        config.sync.refresh_on_connect = true;
        let session = DashboardSession::open(config.sync)?;

        let state = wait_for_state(&session, wait, |state| state.stats().is_some()).await;
        session.close().await;

        let state = state.ok_or_else(|| {
            CliError::Timeout(format!("no stats snapshot within {}s", wait.as_secs()))
        })?;
        let output = if config.cli.pretty_json {
            serde_json::to_string_pretty(&*state)?
        } else {
            serde_json::to_string(&*state)?
        };
        println!("{}", output);
        Ok(())
    }

    /// Connect, emit one event, close
    async fn handle_send_command(
        mut config: AppConfig,
        event: String,
        payload: Option<String>,
    ) -> Result<()> {
        let payload: Value = match payload {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Value::Null,
        };

        config.sync.auto_reconnect = false;
        config.sync.refresh_on_connect = false;
        let wait = config.sync.connect_timeout() + CONNECT_GRACE;
        let session = DashboardSession::open(config.sync)?;

        let connected = wait_for_state(&session, wait, |state| {
            state.status() == ConnectionStatus::Connected
        })
        .await
        .is_some();

        let sent = connected && session.send(&event, payload);
        session.close().await;

        if !connected {
            return Err(CliError::Timeout(format!(
                "not connected within {}ms",
                wait.as_millis()
            )));
        }
        if !sent {
            return Err(CliError::Send(format!("`{}` was not queued", event)));
        }
        println!("Sent {}", event);
        Ok(())
    }

    fn handle_config_command(config: &AppConfig) -> Result<()> {
        print!("{}", config.to_toml()?);
        Ok(())
    }
}

/// Resolve with the first version satisfying `ready`, or `None` after `wait`
async fn wait_for_state<F>(
    session: &DashboardSession,
    wait: Duration,
    ready: F,
) -> Option<Arc<DashboardState>>
where
    F: Fn(&DashboardState) -> bool,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = session.subscribe(move |state| {
        let _ = tx.send(Arc::clone(state));
    });

    let current = session.state();
    let found = if ready(&*current) {
        Some(current)
    } else {
        tokio::time::timeout(wait, async {
            while let Some(state) = rx.recv().await {
                if ready(&*state) {
                    return Some(state);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    };

    subscription.unsubscribe();
    debug!(found = found.is_some(), "Finished waiting for state");
    found
}

/// One-line-per-section human rendering of a version
pub fn render_summary(state: &DashboardState, cli: &CliConfig) -> String {
    let mut out = format!(
        "[v{}] {} | stats: {} | activities: {} | alerts: {}",
        state.version(),
        state.status(),
        state
            .stats()
            .map(|s| format!("{} fields", s.len()))
            .unwrap_or_else(|| "none".to_string()),
        state.activities().len(),
        state.alerts().len(),
    );
    if let Some(alert) = state.alerts().newest() {
        out.push_str(&format!("\n  ! [{}] {} ({})", alert.kind, alert.description, alert.timestamp));
    }
    for entry in state.activities().iter().take(cli.activity_preview) {
        out.push_str(&format!("\n  - [{}] {} ({})", entry.kind, entry.description, entry.timestamp));
    }
    out
}
