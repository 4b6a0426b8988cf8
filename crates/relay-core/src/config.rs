//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero configuration.

use std::path::PathBuf;

use relay_shared::constants::{DEFAULT_FEED_CAPACITY, MAX_SEARCH_RESULTS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// SQLite database file.
    /// Env: `RELAY_DB_PATH`
    /// Default: `None` (platform data directory, `relay.db`).
    pub db_path: Option<PathBuf>,

    /// Local identity file (`{ userId, displayName }` as JSON).
    /// Env: `RELAY_IDENTITY_PATH`
    /// Default: `None` (platform data directory, `identity.json`).
    pub identity_path: Option<PathBuf>,

    /// Maximum id-prefix search results, clamped to `1..=5`.
    /// Env: `RELAY_SEARCH_LIMIT`
    /// Default: `5`
    pub search_limit: usize,

    /// Whether incoming messages raise OS-level notifications and a tone.
    /// In-app toasts are always emitted.
    /// Env: `RELAY_NOTIFICATIONS` (true/false)
    /// Default: `true`
    pub notifications_enabled: bool,

    /// Capacity of the in-process change feed.
    /// Env: `RELAY_FEED_CAPACITY`
    /// Default: `256`
    pub feed_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            identity_path: None,
            search_limit: MAX_SEARCH_RESULTS,
            notifications_enabled: true,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("RELAY_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("RELAY_IDENTITY_PATH").filter(|p| !p.trim().is_empty()) {
            config.identity_path = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("RELAY_SEARCH_LIMIT") {
            match val.trim().parse::<usize>() {
                Ok(n) => config.search_limit = n.clamp(1, MAX_SEARCH_RESULTS),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid RELAY_SEARCH_LIMIT, using default");
                }
            }
        }

        if let Some(val) = lookup("RELAY_NOTIFICATIONS") {
            config.notifications_enabled = val != "false" && val != "0";
        }

        if let Some(val) = lookup("RELAY_FEED_CAPACITY") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.feed_capacity = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid RELAY_FEED_CAPACITY, using default");
                }
            }
        }

        // RUST_LOG is read by the EnvFilter in `init_tracing`.

        config
    }
}
