//! Chat server configuration.
//!
//! Loaded from environment variables, with defaults matching the reference
//! deployment on port 12345.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:12345";

pub const DEFAULT_BIND_ATTEMPTS: u32 = 5;

pub const DEFAULT_BIND_RETRY_DELAY_MS: u64 = 2000;

/// Pause after releasing resources so the OS can free the port.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Listening address (default: "0.0.0.0:12345").
    pub bind_address: SocketAddr,

    /// How many times to try binding while the port is busy (default: 5).
    pub bind_attempts: u32,

    /// Wait between bind attempts (default: 2s).
    pub bind_retry_delay: Duration,

    /// Wait at the end of shutdown (default: 1s).
    pub shutdown_grace: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 12345)),
            bind_attempts: DEFAULT_BIND_ATTEMPTS,
            bind_retry_delay: Duration::from_millis(DEFAULT_BIND_RETRY_DELAY_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = parse_var(vars, "CHATROOM_BIND_ADDRESS")?.unwrap_or_else(|| {
            Config::default().bind_address
        });

        let bind_attempts = parse_var(vars, "CHATROOM_BIND_ATTEMPTS")?.unwrap_or(DEFAULT_BIND_ATTEMPTS);
        if bind_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "CHATROOM_BIND_ATTEMPTS".to_string(),
                value: "0".to_string(),
            });
        }

        let bind_retry_delay_ms = parse_var(vars, "CHATROOM_BIND_RETRY_DELAY_MS")?
            .unwrap_or(DEFAULT_BIND_RETRY_DELAY_MS);

        let shutdown_grace_ms = parse_var(vars, "CHATROOM_SHUTDOWN_GRACE_MS")?
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS);

        Ok(Config {
            bind_address,
            bind_attempts,
            bind_retry_delay: Duration::from_millis(bind_retry_delay_ms),
            shutdown_grace: Duration::from_millis(shutdown_grace_ms),
        })
    }
}

fn parse_var<T: FromStr>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>, ConfigError> {
    vars.get(name)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value: value.clone(),
            })
        })
        .transpose()
}
