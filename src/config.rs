//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`VAULTLINK_*`)
//! - Direct construction by the host application

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Lower bound on the retry interval, to avoid busy-looping against an
/// unavailable companion app
pub const MIN_RETRY_INTERVAL_MS: u64 = 100;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name shown to the user in the companion app's handshake approval
    #[serde(default = "defaults::application_name")]
    pub application_name: String,

    /// Delay before retrying a failed connection attempt, in milliseconds
    #[serde(default = "defaults::retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Period of the lock-status poller while the vault is locked,
    /// in milliseconds
    #[serde(default = "defaults::status_refresh_interval_ms")]
    pub status_refresh_interval_ms: u64,

    /// How long to wait for a status response before reporting the
    /// companion app as unresponsive, in milliseconds
    #[serde(default = "defaults::response_timeout_ms")]
    pub response_timeout_ms: u64,
}

mod defaults {
    pub fn application_name() -> String {
        "VaultLink".to_string()
    }

    pub fn retry_interval_ms() -> u64 {
        1_000
    }

    pub fn status_refresh_interval_ms() -> u64 {
        2_000
    }

    pub fn response_timeout_ms() -> u64 {
        5_000
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_name: defaults::application_name(),
            retry_interval_ms: defaults::retry_interval_ms(),
            status_refresh_interval_ms: defaults::status_refresh_interval_ms(),
            response_timeout_ms: defaults::response_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| VaultError::Config(format!("Failed to read config file: {e}")))?;

        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("VAULTLINK_APPLICATION_NAME") {
            config.application_name = name;
        }
        if let Ok(val) = std::env::var("VAULTLINK_RETRY_INTERVAL_MS") {
            if let Ok(val) = val.parse() {
                config.retry_interval_ms = val;
            }
        }
        if let Ok(val) = std::env::var("VAULTLINK_STATUS_REFRESH_INTERVAL_MS") {
            if let Ok(val) = val.parse() {
                config.status_refresh_interval_ms = val;
            }
        }
        if let Ok(val) = std::env::var("VAULTLINK_RESPONSE_TIMEOUT_MS") {
            if let Ok(val) = val.parse() {
                config.response_timeout_ms = val;
            }
        }

        config
    }

    /// Clamp intervals to safe bounds
    pub fn validated(mut self) -> Self {
        self.retry_interval_ms = self.retry_interval_ms.max(MIN_RETRY_INTERVAL_MS);
        self
    }

    /// Retry delay as a [`Duration`]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Lock-status poll period as a [`Duration`]
    pub fn status_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.status_refresh_interval_ms)
    }

    /// Response deadline as a [`Duration`]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
