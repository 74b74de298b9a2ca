//! Configuration Module
//!
//! Handles loading and managing node configuration from environment variables.

use std::env;

/// Default subject replication envelopes are published on.
pub const DEFAULT_REPLICATE_SUBJECT: &str = "chatty.replicate";

/// Default NATS server address.
pub const DEFAULT_NATS_URL: &str = "localhost:30221";

/// Default cache budget in bytes (2 MiB).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 2 * 1024 * 1024;

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache budget in bytes, 0 disables size checks
    pub max_cache_size: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Bus subject used for replication traffic
    pub replicate_subject: String,
    /// Message bus address
    pub nats_url: String,
    /// Shared passphrase, empty means envelopes go out unencrypted
    pub passphrase: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_CACHE_SIZE` - Cache budget in bytes (default: 2097152)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CHATTY_NATS_SUBJECT` - Replication subject (default: chatty.replicate)
    /// - `NATS_SERVER` - Bus address (default: localhost:30221)
    /// - `CHATTY_PASSPHRASE` - Encryption passphrase (default: empty)
    pub fn from_env() -> Self {
        Self {
            max_cache_size: env::var("MAX_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CACHE_SIZE),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            replicate_subject: non_empty_var("CHATTY_NATS_SUBJECT")
                .unwrap_or_else(|| DEFAULT_REPLICATE_SUBJECT.to_string()),
            nats_url: non_empty_var("NATS_SERVER")
                .unwrap_or_else(|| DEFAULT_NATS_URL.to_string()),
            passphrase: env::var("CHATTY_PASSPHRASE").unwrap_or_default(),
        }
    }

    /// Returns true when replication traffic will be encrypted.
    pub fn encryption_enabled(&self) -> bool {
        !self.passphrase.is_empty()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            server_port: 3000,
            replicate_subject: DEFAULT_REPLICATE_SUBJECT.to_string(),
            nats_url: DEFAULT_NATS_URL.to_string(),
            passphrase: String::new(),
        }
    }
}
