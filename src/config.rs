//! Configuration module for the chat relay.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{RelayError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on (0 lets the OS pick one).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address announced to clients in `SERVER_IP:` (defaults to `host`).
    #[serde(default)]
    pub advertised_host: Option<String>,
    /// Port announced to clients in `PORT:` (defaults to the bound port).
    #[serde(default)]
    pub advertised_port: Option<u16>,
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds a session may wait for the next line (0 = no limit).
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Seconds allowed for a single frame write to a client.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    /// Frames buffered per connection before broadcasts to it are dropped.
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_connections() -> usize {
    100
}

fn default_read_timeout() -> u64 {
    300
}

fn default_write_timeout() -> u64 {
    10
}

fn default_outbound_queue_size() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            advertised_host: None,
            advertised_port: None,
            max_connections: default_max_connections(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            outbound_queue_size: default_outbound_queue_size(),
        }
    }
}

impl ServerConfig {
    /// Read timeout as a duration, `None` when disabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    /// Write timeout as a duration.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/chatrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CHATRELAY_ADVERTISED_HOST`: address reported in join replies
    /// - `CHATRELAY_ADVERTISED_PORT`: port reported in join replies
    ///
    /// Empty or unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CHATRELAY_ADVERTISED_HOST") {
            if !host.is_empty() {
                self.server.advertised_host = Some(host);
            }
        }
        if let Ok(port) = std::env::var("CHATRELAY_ADVERTISED_PORT") {
            if let Ok(port) = port.trim().parse() {
                self.server.advertised_port = Some(port);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(RelayError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.server.outbound_queue_size == 0 {
            return Err(RelayError::Config(
                "outbound_queue_size must be greater than 0".to_string(),
            ));
        }
        if self.server.write_timeout_secs == 0 {
            return Err(RelayError::Config(
                "write_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
