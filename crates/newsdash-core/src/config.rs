//! Configuration for a dashboard sync session

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::{ACTIVITY_CAPACITY, ALERT_CAPACITY};

// ----------------------------------------------------------------------------
// Framing
// ----------------------------------------------------------------------------

/// Message framing spoken over the WebSocket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Socket.IO v4 over Engine.IO v4 (what the news backend serves)
    #[default]
    SocketIo,
    /// One `{"event": ..., "data": ...}` object per text frame
    Json,
}

impl core::str::FromStr for Framing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socketio" | "socket.io" => Ok(Framing::SocketIo),
            "json" => Ok(Framing::Json),
            other => Err(ConfigError::Validation(format!("Unknown framing: {}", other))),
        }
    }
}

// ----------------------------------------------------------------------------
// Backoff Configuration
// ----------------------------------------------------------------------------

/// Capped exponential backoff with jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any delay, in milliseconds
    pub max_delay_ms: u64,
    /// Jitter added on top of the exponential delay, as a fraction of it
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ratio: 0.2,
        }
    }
}

impl BackoffConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Fixed delays, no jitter; handy for deterministic tests
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            jitter_ratio: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay_ms == 0 {
            return Err(ConfigError::Validation("Backoff base delay must be greater than 0".to_string()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::Validation(format!(
                "Backoff max delay ({}ms) is below the base delay ({}ms)",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::Validation(format!(
                "Backoff jitter ratio must be within [0, 1], got {}",
                self.jitter_ratio
            )));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Everything a dashboard session needs to connect and keep its state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Backend push endpoint (`http(s)://` or `ws(s)://`)
    pub endpoint: String,
    /// Framing spoken on the socket
    pub framing: Framing,
    /// Bound on the connection handshake, in milliseconds
    pub connect_timeout_ms: u64,
    /// Liveness ping period for links whose server announces none, in
    /// milliseconds. Socket.IO servers override this with `pingInterval`.
    pub heartbeat_interval_ms: u64,
    /// Extra silence tolerated after a missed ping before the link is
    /// declared dead, in milliseconds (Socket.IO: `pingTimeout`)
    pub heartbeat_timeout_ms: u64,
    /// Retry indefinitely after link loss
    pub auto_reconnect: bool,
    /// Ask for a fresh stats snapshot after every successful connect
    pub refresh_on_connect: bool,
    /// Retry delay policy
    pub backoff: BackoffConfig,
    /// Activity feed capacity
    pub activity_capacity: usize,
    /// Alert feed capacity
    pub alert_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000".to_string(),
            framing: Framing::SocketIo,
            connect_timeout_ms: 10_000,
            heartbeat_interval_ms: 25_000,
            heartbeat_timeout_ms: 20_000,
            auto_reconnect: true,
            refresh_on_connect: true,
            backoff: BackoffConfig::default(),
            activity_capacity: ACTIVITY_CAPACITY,
            alert_capacity: ALERT_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Default configuration pointed at `endpoint`
    pub fn with_endpoint<T: Into<String>>(endpoint: T) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Short timeouts and quick retries for a backend on the same machine
    pub fn local_development() -> Self {
        Self {
            endpoint: "http://localhost:5000".to_string(),
            connect_timeout_ms: 2_000,
            backoff: BackoffConfig {
                base_delay_ms: 250,
                max_delay_ms: 5_000,
                jitter_ratio: 0.2,
            },
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Validation("Endpoint must not be empty".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation("Connect timeout must be greater than 0".to_string()));
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Heartbeat interval and timeout must be greater than 0".to_string(),
            ));
        }
        if self.activity_capacity == 0 || self.alert_capacity == 0 {
            return Err(ConfigError::Validation("Feed capacities must be greater than 0".to_string()));
        }
        self.backoff.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.activity_capacity, 10);
        assert_eq!(config.alert_capacity, 5);
        assert!(SyncConfig::local_development().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_backoff() {
        let mut config = SyncConfig::default();
        config.backoff.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.backoff.jitter_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.backoff.base_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_endpoint_and_capacity() {
        assert!(SyncConfig::with_endpoint("  ").validate().is_err());

        let mut config = SyncConfig::default();
        config.alert_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.heartbeat_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_framing_parses_case_insensitively() {
        assert_eq!("SocketIO".parse::<Framing>().unwrap(), Framing::SocketIo);
        assert_eq!("json".parse::<Framing>().unwrap(), Framing::Json);
        assert!("grpc".parse::<Framing>().is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"endpoint": "ws://feed:9000", "framing": "json"}"#).unwrap();
        assert_eq!(config.endpoint, "ws://feed:9000");
        assert_eq!(config.framing, Framing::Json);
        assert_eq!(config.backoff, BackoffConfig::default());
    }
}
