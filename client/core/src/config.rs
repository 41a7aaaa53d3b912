//! Client Configuration
//!
//! Connection knobs for the overlay client, loadable from a TOML file under
//! the platform config dir with environment-variable overrides.
//!
//! Environment variables:
//! - `OVERLAY_HUB_URL`: chat hub endpoint
//! - `OVERLAY_KEEP_ALIVE`: "0" or "false" to disable the heartbeat
//! - `OVERLAY_KEEP_ALIVE_INTERVAL`: heartbeat interval in ms
//! - `OVERLAY_CONNECT_TIMEOUT`: connect timeout in ms
//! - `OVERLAY_RECONNECT_ATTEMPTS`: automatic reconnect budget
//! - `OVERLAY_DATA_DIR`: directory for the persisted chat list

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default hub endpoint
pub const DEFAULT_HUB_URL: &str = "ws://127.0.0.1:8080/chatHub";

/// Default reconnect backoff schedule in milliseconds, indexed by attempt
/// and clamped to the last entry
pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 6] = [0, 2_000, 5_000, 10_000, 20_000, 30_000];

/// Configuration load errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chat hub endpoint
    pub hub_url: String,

    /// Whether to send periodic heartbeats while connected
    pub keep_alive: bool,

    /// Heartbeat interval in milliseconds
    pub keep_alive_interval_ms: u64,

    /// How long a single connect attempt may take, in milliseconds
    pub connect_timeout_ms: u64,

    /// Automatic reconnect budget (0 = never reconnect automatically)
    pub reconnect_attempts: u32,

    /// Backoff schedule in milliseconds, indexed by attempt count and
    /// clamped to the last entry
    pub reconnect_delays_ms: Vec<u64>,

    /// Directory for the persisted chat list (None = platform data dir)
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.to_string(),
            keep_alive: true,
            keep_alive_interval_ms: 30_000,
            connect_timeout_ms: 5_000,
            reconnect_attempts: 5,
            reconnect_delays_ms: DEFAULT_RECONNECT_DELAYS_MS.to_vec(),
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load from the default config file (if present), then apply
    /// environment overrides
    #[must_use]
    pub fn load() -> Self {
        let base = match default_config_path() {
            Some(path) if path.exists() => match Self::load_from_path(&path) {
                Ok(config) => {
                    tracing::debug!(path = ?path, "loaded config file");
                    config
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = ?path, "ignoring unreadable config file");
                    Self::default()
                }
            },
            _ => Self::default(),
        };
        base.apply_env()
    }

    /// Load configuration from a TOML file
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Apply environment-variable overrides
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("OVERLAY_HUB_URL") {
            self.hub_url = url;
        }
        if let Ok(v) = std::env::var("OVERLAY_KEEP_ALIVE") {
            self.keep_alive = v != "0" && v.to_lowercase() != "false";
        }
        if let Some(ms) = env_u64("OVERLAY_KEEP_ALIVE_INTERVAL") {
            self.keep_alive_interval_ms = ms;
        }
        if let Some(ms) = env_u64("OVERLAY_CONNECT_TIMEOUT") {
            self.connect_timeout_ms = ms;
        }
        if let Some(n) = env_u64("OVERLAY_RECONNECT_ATTEMPTS") {
            self.reconnect_attempts = n as u32;
        }
        if let Ok(dir) = std::env::var("OVERLAY_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Heartbeat interval as a [`Duration`]
    #[must_use]
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    /// Connect timeout as a [`Duration`]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Backoff delay for the given zero-based attempt index, clamped to the
    /// last schedule entry
    #[must_use]
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let ms = self
            .reconnect_delays_ms
            .get(attempt as usize)
            .or_else(|| self.reconnect_delays_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Default config file path: `<config dir>/overlay-chat/config.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("overlay-chat").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_matches_protocol_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.hub_url, DEFAULT_HUB_URL);
        assert_eq!(config.keep_alive_interval_ms, 30_000);
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delays_ms.len(), 6);
    }

    #[test]
    fn reconnect_delay_clamps_to_last_entry() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect_delay(0), Duration::ZERO);
        assert_eq!(config.reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(5), Duration::from_secs(30));
        assert_eq!(config.reconnect_delay(99), Duration::from_secs(30));
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hub_url = \"ws://10.0.0.5:9000/chatHub\"\n").unwrap();

        let config = ClientConfig::load_from_path(&path).unwrap();
        assert_eq!(config.hub_url, "ws://10.0.0.5:9000/chatHub");
        assert_eq!(config.reconnect_attempts, 5);
    }

    #[test]
    fn rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hub_url = [not toml").unwrap();

        assert!(matches!(
            ClientConfig::load_from_path(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
