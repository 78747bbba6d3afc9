use std::net::SocketAddr;

use crate::types::AlertThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Full runtime configuration, loaded from environment variables.
///
/// Every operational knob of the engine is an explicit field here; nothing
/// consults globals at call time.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,

    /// Base URL of the upstream comment/metadata API.
    pub upstream_base_url: String,
    /// Optional API key sent as a query parameter to the upstream.
    pub upstream_api_key: Option<String>,
    pub http_timeout_secs: u64,
    pub http_user_agent: String,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    /// Default polling cadence for resources added without an explicit one.
    pub poll_interval_secs: u64,
    /// Maximum comments fetched per cycle per resource.
    pub fetch_limit: u32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    /// Alert cooldown window; `None` means one polling interval per resource.
    pub alert_cooldown_secs: Option<u64>,
    /// Metadata cache TTL; `None` means entries never go stale.
    pub metadata_ttl_secs: Option<u64>,
    pub thresholds: AlertThresholds,

    /// Resource ids to start monitoring at boot (comma-separated env var).
    pub watch_resources: Vec<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("upstream_base_url", &self.upstream_base_url)
            .field(
                "upstream_api_key",
                &self.upstream_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("fetch_limit", &self.fetch_limit)
            .field("backoff_base_secs", &self.backoff_base_secs)
            .field("backoff_cap_secs", &self.backoff_cap_secs)
            .field("alert_cooldown_secs", &self.alert_cooldown_secs)
            .field("metadata_ttl_secs", &self.metadata_ttl_secs)
            .field("thresholds", &self.thresholds)
            .field("watch_resources", &self.watch_resources)
            .finish()
    }
}
