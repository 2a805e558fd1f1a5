//! Configuration management for Turnstile.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{presets, RateLimitPolicy, DEFAULT_CAPACITY};

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Bucket store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Named rate limit policies.
    ///
    /// Entries here override the built-in presets of the same name; names
    /// without an entry fall back to the presets at lookup time.
    #[serde(default)]
    pub policies: HashMap<String, RateLimitPolicy>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("static address")
}

/// Bucket store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of buckets held in memory
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Entry time-to-live in seconds, measured from last write
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            entry_ttl_secs: default_entry_ttl_secs(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_entry_ttl_secs() -> u64 {
    3600
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        info!(path = %path, "Loading configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// Look up a policy by name.
    ///
    /// Configured entries win; otherwise the built-in presets answer for
    /// their names. Unknown names yield `None`.
    pub fn policy(&self, name: &str) -> Option<RateLimitPolicy> {
        if let Some(policy) = self.policies.get(name) {
            return Some(*policy);
        }
        match name {
            "auth" => Some(presets::AUTH),
            "api" => Some(presets::API),
            "readonly" => Some(presets::READONLY),
            "expensive" => Some(presets::EXPENSIVE),
            _ => None,
        }
    }

    /// Store entry TTL in milliseconds.
    pub fn entry_ttl_ms(&self) -> u64 {
        self.store.entry_ttl_secs * 1000
    }
}
