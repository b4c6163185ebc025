//! newsdash CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! 1. Built-in defaults
//! 2. `newsdash.toml` in the working directory
//! 3. `<config dir>/newsdash/config.toml` (e.g. `~/.config/newsdash/config.toml`)
//! 4. The file passed with `--config`
//! 5. `NEWSDASH_*` environment variables, nested with `__`
//!    (`NEWSDASH_SYNC__ENDPOINT`, `NEWSDASH_SYNC__BACKOFF__MAX_DELAY_MS`)
//! 6. Command line flags

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use newsdash_core::{Framing, SyncConfig};
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// Working-directory configuration file
pub const LOCAL_CONFIG_FILE: &str = "newsdash.toml";
/// Environment variable prefix
pub const ENV_PREFIX: &str = "NEWSDASH_";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the newsdash CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session settings handed to the sync engine
    pub sync: SyncConfig,
    /// Terminal presentation settings
    pub cli: CliConfig,
}

/// CLI-specific presentation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,
    /// Pretty-print JSON output of `snapshot`
    pub pretty_json: bool,
    /// Number of activities shown per version by `watch`
    pub activity_preview: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            pretty_json: true,
            activity_preview: 3,
        }
    }
}

/// Values taken from command line flags
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub framing: Option<Framing>,
    pub verbose: bool,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration with the standard priority order
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let config: AppConfig = Self::figment(overrides)?.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(overrides: &Overrides) -> Result<Figment> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(LOCAL_CONFIG_FILE));

        if let Some(path) = Self::default_config_path() {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = &overrides.config_file {
            if !path.is_file() {
                return Err(CliError::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(endpoint) = &overrides.endpoint {
            figment = figment.merge(("sync.endpoint", endpoint));
        }
        if let Some(framing) = overrides.framing {
            figment = figment.merge(("sync.framing", framing));
        }
        if overrides.verbose {
            figment = figment.merge(("cli.verbose", true));
        }
        Ok(figment)
    }

    /// Per-user configuration file, if the platform has a config directory
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("newsdash").join("config.toml"))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        Ok(())
    }

    /// Render as TOML, the format the configuration files use
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
