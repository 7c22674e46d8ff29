use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Server settings. The listener always binds 127.0.0.1; only the port varies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listening port; 0 lets the OS pick one
    pub port: u16,
    /// Upper bound on each readiness wait, in milliseconds
    pub poll_timeout_ms: u64,
    /// Size of the receive buffer reused across connections
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            poll_timeout_ms: 1000,
            recv_buffer_size: 20_000,
        }
    }
}

impl Config {
    /// Reads `PORT`, `POLL_TIMEOUT_MS` and `RECV_BUFFER_SIZE` from the
    /// environment. Missing or unparsable values fall back to the defaults.
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            port: env_or("PORT", defaults.port),
            poll_timeout_ms: env_or("POLL_TIMEOUT_MS", defaults.poll_timeout_ms),
            recv_buffer_size: env_or("RECV_BUFFER_SIZE", defaults.recv_buffer_size),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("invalid server configuration")
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
            default
        }),
        Err(_) => default,
    }
}
