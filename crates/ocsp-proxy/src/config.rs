//! Proxy configuration
//!
//! Configuration is assembled from an optional JSON file plus command-line
//! overrides; every field has a default so a bare `ocsp_proxy` invocation
//! serves `127.0.0.1:8888` against a local Valkey socket.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Shared cache store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Upstream responder access
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Background re-validation schedule
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Delete the cache entry when a handler's on-miss upstream fetch fails.
    /// The historical fail-closed behavior; disabling keeps stale entries
    /// around until the next successful fetch overwrites them.
    #[serde(default = "default_evict_on_upstream_failure")]
    pub evict_on_upstream_failure: bool,

    /// Enable debug logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_listen_address() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    8888
}

fn default_evict_on_upstream_failure() -> bool {
    true
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            store: StoreConfig::default(),
            upstream: UpstreamConfig::default(),
            refresh: RefreshConfig::default(),
            evict_on_upstream_failure: default_evict_on_upstream_failure(),
            verbose: false,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: ProxyConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.store.key_prefix.is_empty() {
            return Err(ConfigError::Invalid("key prefix must not be empty".into()));
        }
        if self.refresh.cycle_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh cycle must be at least one second".into(),
            ));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream timeout must be at least one second".into(),
            ));
        }

        Ok(())
    }

    /// The listen address as a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.listen_address, self.listen_port)
            .parse()
            .map_err(|e| {
                ConfigError::Invalid(format!(
                    "invalid listen address {}:{}: {}",
                    self.listen_address, self.listen_port, e
                ))
            })
    }
}

/// Valkey/Redis connection configuration
///
/// Supported URLs:
/// - `redis://host:port` (TCP)
/// - `redis://host:port/db` (TCP with database selection)
/// - `unix:///path/to/socket` (Unix socket)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Prefix for all cache keys; also the enumeration prefix of the
    /// refresher
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Maximum number of retries for failed commands
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_store_url() -> String {
    "unix:///run/redis/redis.sock".to_string()
}

fn default_key_prefix() -> String {
    "ocspxy_".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            key_prefix: default_key_prefix(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl StoreConfig {
    /// Create a new store configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the cache key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Get the retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Upstream responder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// HTTP timeout for upstream fetches, in seconds
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,

    /// Upstreams the proxy may contact, as `host` or `host:port`.
    /// Unset means any upstream named by a client `Host` header is allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowlist: Option<Vec<String>>,
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_upstream_timeout_secs(),
            allowlist: None,
        }
    }
}

impl UpstreamConfig {
    /// Whether the given responder may be contacted
    pub fn allows(&self, responder: &str) -> bool {
        match &self.allowlist {
            None => true,
            Some(hosts) => hosts.iter().any(|h| h == responder),
        }
    }

    /// Get the fetch timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Background re-validation schedule
///
/// Entries in the first half of their validity window are re-checked on the
/// early interval (daily); past the midpoint the late interval (hourly)
/// applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Sleep between refresh cycles, in seconds
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,

    /// Re-validation interval before the validity midpoint, in seconds
    #[serde(default = "default_early_interval_secs")]
    pub early_interval_secs: i64,

    /// Re-validation interval past the validity midpoint, in seconds
    #[serde(default = "default_late_interval_secs")]
    pub late_interval_secs: i64,
}

fn default_cycle_secs() -> u64 {
    1800
}

fn default_early_interval_secs() -> i64 {
    86_400
}

fn default_late_interval_secs() -> i64 {
    3600
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cycle_secs: default_cycle_secs(),
            early_interval_secs: default_early_interval_secs(),
            late_interval_secs: default_late_interval_secs(),
        }
    }
}

impl RefreshConfig {
    /// Get the cycle sleep as a Duration
    pub fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen_address, "127.0.0.1");
        assert_eq!(config.listen_port, 8888);
        assert_eq!(config.store.url, "unix:///run/redis/redis.sock");
        assert_eq!(config.store.key_prefix, "ocspxy_");
        assert_eq!(config.refresh.cycle_secs, 1800);
        assert_eq!(config.refresh.early_interval_secs, 86_400);
        assert_eq!(config.refresh.late_interval_secs, 3600);
        assert!(config.evict_on_upstream_failure);
        assert!(!config.verbose);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: ProxyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.listen_port, 8888);
        assert_eq!(config.upstream.timeout_secs, 10);
    }

    #[test]
    fn test_partial_json_override() {
        let config: ProxyConfig = serde_json::from_str(
            r#"{
                "listen_port": 9999,
                "store": {"url": "redis://cache.internal:6379", "key_prefix": "test_"},
                "upstream": {"allowlist": ["ocsp.example.com"]}
            }"#,
        )
        .unwrap();
        assert_eq!(config.listen_port, 9999);
        assert_eq!(config.store.url, "redis://cache.internal:6379");
        assert_eq!(config.store.key_prefix, "test_");
        assert_eq!(config.store.max_retries, 3);
        assert!(config.upstream.allows("ocsp.example.com"));
        assert!(!config.upstream.allows("evil.example.com"));
    }

    #[test]
    fn test_no_allowlist_allows_everything() {
        let config = UpstreamConfig::default();
        assert!(config.allows("anything.example.net"));
        assert!(config.allows("127.0.0.1:8080"));
    }

    #[test]
    fn test_invalid_listen_address() {
        let config = ProxyConfig {
            listen_address: "not an address".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let mut config = ProxyConfig::default();
        config.store.key_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_builder() {
        let store = StoreConfig::new("redis://localhost:6379")
            .with_key_prefix("x_")
            .with_max_retries(5);
        assert_eq!(store.url, "redis://localhost:6379");
        assert_eq!(store.key_prefix, "x_");
        assert_eq!(store.max_retries, 5);
        assert_eq!(store.retry_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ProxyConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ProxyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.listen_port, config.listen_port);
        assert_eq!(deserialized.store.key_prefix, config.store.key_prefix);
    }
}
