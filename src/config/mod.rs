//! Configuration management

use crate::channel::ChannelKind;
use crate::transport::{BackoffConfig, ReconnectPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub endpoint: EndpointConfig,
    pub reconnect: ReconnectConfig,
    pub console: ConsoleConfig,
}

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Where the admin backend listens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    /// Use `wss://` instead of `ws://`
    pub secure: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            secure: false,
        }
    }
}

/// Backoff for channels that reconnect on their own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 retries forever
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            max_attempts: 20,
        }
    }
}

/// Console front-end settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Prefix log lines with their local time
    pub show_timestamps: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            show_timestamps: true,
        }
    }
}

impl Config {
    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gmconsole")
            .join("config.toml")
    }

    /// Full WebSocket URL of a channel's endpoint
    pub fn endpoint_url(&self, kind: ChannelKind) -> String {
        let scheme = if self.endpoint.secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}{}",
            scheme,
            self.endpoint.host,
            self.endpoint.port,
            kind.path()
        )
    }

    pub fn backoff(&self) -> BackoffConfig {
        let r = &self.reconnect;
        BackoffConfig {
            initial_delay: Duration::from_millis(r.initial_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms.max(r.initial_delay_ms)),
            max_attempts: (r.max_attempts > 0).then_some(r.max_attempts),
        }
    }

    /// GM reconnects on demand; console and export back off on their own
    pub fn policy_for(&self, kind: ChannelKind) -> ReconnectPolicy {
        match kind {
            ChannelKind::Gm => ReconnectPolicy::Lazy,
            ChannelKind::Console | ChannelKind::Export => ReconnectPolicy::Eager(self.backoff()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.endpoint_url(ChannelKind::Console),
            "ws://localhost:9000/telnet"
        );
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[endpoint]\nhost = \"admin.example\"\nsecure = true\n\n[reconnect]\nmax_attempts = 0"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(
            config.endpoint_url(ChannelKind::Export),
            "wss://admin.example:9000/exportTable"
        );
        assert_eq!(config.backoff().max_attempts, None);
        assert_eq!(config.backoff().initial_delay, Duration::from_millis(500));
        assert!(config.console.show_timestamps);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[endpoint]\nport = \"nine\"").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_policy_per_channel() {
        let config = Config::default();
        assert_eq!(config.policy_for(ChannelKind::Gm), ReconnectPolicy::Lazy);
        assert_eq!(
            config.policy_for(ChannelKind::Console),
            ReconnectPolicy::Eager(BackoffConfig::default())
        );
    }
}
