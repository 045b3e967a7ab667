//! Configuration Module
//!
//! Handles loading and managing context configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::cache::SyncMode;
use crate::notify::NotifyKind;

/// Default polling fallback interval (60 seconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

/// Default quota for the durable stores (5 MiB)
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Context configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Polling fallback interval in milliseconds
    pub poll_interval_ms: u64,
    /// Backends to try, richest first
    pub backend_order: Vec<BackendKind>,
    /// Requested cross-context notification strategy
    pub notify_kind: NotifyKind,
    /// Whether writes persist immediately or on explicit flush
    pub sync_mode: SyncMode,
    /// Prefix applied to keys in the same-origin store
    pub key_prefix: String,
    /// Name of the broadcast channel shared by all contexts
    pub channel_name: String,
    /// Backing file for the script store, in-memory when unset
    pub store_path: Option<PathBuf>,
    /// Byte quota of the script store
    pub store_quota_bytes: usize,
    /// HTTP server port for the inspection API
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `POLL_INTERVAL_MS` - Polling fallback interval (default: 60000)
    /// - `BACKEND_ORDER` - Comma separated backend kinds (default: script,origin)
    /// - `NOTIFY_STRATEGY` - Notification strategy (default: broadcast)
    /// - `SYNC_MODE` - `manual` or `auto` (default: manual)
    /// - `KEY_PREFIX` - Same-origin key prefix (default: tabsync_)
    /// - `CHANNEL_NAME` - Broadcast channel name (default: tabsync_broadcastchannel)
    /// - `STORE_PATH` - Script store file (default: in-memory)
    /// - `STORE_QUOTA_BYTES` - Script store quota (default: 5 MiB)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval_ms: parse_var("POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval_ms),
            backend_order: env::var("BACKEND_ORDER")
                .ok()
                .and_then(|v| parse_backend_order(&v))
                .unwrap_or(defaults.backend_order),
            notify_kind: parse_var("NOTIFY_STRATEGY").unwrap_or(defaults.notify_kind),
            sync_mode: parse_var("SYNC_MODE").unwrap_or(defaults.sync_mode),
            key_prefix: env::var("KEY_PREFIX").unwrap_or(defaults.key_prefix),
            channel_name: env::var("CHANNEL_NAME").unwrap_or(defaults.channel_name),
            store_path: env::var("STORE_PATH").ok().map(PathBuf::from),
            store_quota_bytes: parse_var("STORE_QUOTA_BYTES").unwrap_or(defaults.store_quota_bytes),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    /// Polling fallback interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backend_order: vec![BackendKind::Script, BackendKind::Origin],
            notify_kind: NotifyKind::Broadcast,
            sync_mode: SyncMode::Manual,
            key_prefix: "tabsync_".to_string(),
            channel_name: "tabsync_broadcastchannel".to_string(),
            store_path: None,
            store_quota_bytes: DEFAULT_QUOTA_BYTES,
            server_port: 3000,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Parses `script,origin` style lists. Any unknown entry invalidates the whole list.
fn parse_backend_order(raw: &str) -> Option<Vec<BackendKind>> {
    let kinds = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(BackendKind::from_str)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if kinds.is_empty() {
        None
    } else {
        Some(kinds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.poll_interval_ms, 60_000);
        assert_eq!(
            config.backend_order,
            vec![BackendKind::Script, BackendKind::Origin]
        );
        assert_eq!(config.notify_kind, NotifyKind::Broadcast);
        assert_eq!(config.sync_mode, SyncMode::Manual);
        assert_eq!(config.server_port, 3000);
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("POLL_INTERVAL_MS");
        env::remove_var("BACKEND_ORDER");
        env::remove_var("NOTIFY_STRATEGY");
        env::remove_var("SYNC_MODE");
        env::remove_var("STORE_PATH");

        let config = Config::from_env();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.notify_kind, NotifyKind::Broadcast);
        assert_eq!(config.sync_mode, SyncMode::Manual);
    }

    #[test]
    fn test_parse_backend_order() {
        assert_eq!(
            parse_backend_order("origin, none"),
            Some(vec![BackendKind::Origin, BackendKind::None])
        );
        assert_eq!(parse_backend_order("origin,floppy"), None);
        assert_eq!(parse_backend_order(" , "), None);
    }
}
