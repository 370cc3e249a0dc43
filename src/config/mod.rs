//! Configuration management for the event sync engine
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files. Command-line overrides are applied by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::crawler::delay::RandomDelay;
use crate::crawler::identity::MIN_USER_AGENTS;
use crate::crawler::limiter::SlidingWindowLimiter;
use crate::models::TargetArea;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pacing, limiter and cache settings
    pub sync: SyncConfig,

    /// Upstream endpoints and retry budgets
    pub upstream: UpstreamConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Areas synced when none are given on the command line
    pub areas: Vec<TargetArea>,
}

/// Run pacing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum requests inside one limiter window
    pub max_requests: usize,

    /// Limiter window length in seconds
    pub window_secs: u64,

    /// Safety margin added to limiter waits, in milliseconds
    pub window_margin_ms: u64,

    /// Response cache TTL in seconds
    pub cache_ttl_secs: u64,

    pub request_delay_min_ms: u64,
    pub request_delay_max_ms: u64,

    pub event_pause_min_ms: u64,
    pub event_pause_max_ms: u64,

    pub area_cooldown_min_ms: u64,
    pub area_cooldown_max_ms: u64,

    /// Upper bound of the jitter added to 429/transient backoff
    pub jitter_ms: u64,

    /// Upper bound of the jitter added to 401/403 backoff
    pub block_jitter_ms: u64,

    /// Cap for any single backoff wait, in seconds
    pub max_backoff_secs: u64,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Number of error strings kept in a run result
    pub max_errors_reported: usize,
}

/// Upstream endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL; feed and query endpoints are derived from it
    pub base_url: String,

    /// Total attempts for a feed fetch
    pub feed_max_retries: u32,
    pub feed_base_delay_ms: u64,

    /// Total attempts for a query fetch
    pub query_max_retries: u32,
    pub query_base_delay_ms: u64,

    /// `pageSize` sent with the GraphQL query
    pub query_page_size: usize,

    /// Cap on feed items taken per area
    pub max_events_per_area: usize,

    /// Custom user-agent pool; empty means the built-in pool
    pub user_agents: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 3600,
            window_margin_ms: 1000,
            cache_ttl_secs: 1800,
            request_delay_min_ms: 1000,
            request_delay_max_ms: 3000,
            event_pause_min_ms: 200,
            event_pause_max_ms: 800,
            area_cooldown_min_ms: 5000,
            area_cooldown_max_ms: 10_000,
            jitter_ms: 1000,
            block_jitter_ms: 5000,
            max_backoff_secs: 600,
            request_timeout_secs: 15,
            max_errors_reported: 10,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://ra.co"),
            feed_max_retries: 2,
            feed_base_delay_ms: 3000,
            query_max_retries: 2,
            query_base_delay_ms: 5000,
            query_page_size: 20,
            max_events_per_area: 10,
            user_agents: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/events.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            upstream: UpstreamConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            areas: default_areas(),
        }
    }
}

/// Areas synced out of the box
pub fn default_areas() -> Vec<TargetArea> {
    vec![
        TargetArea::new("madrid", "Madrid", "Spain"),
        TargetArea::new("barcelona", "Barcelona", "Spain"),
    ]
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables, defaulting anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse("EVENTSYNC_MAX_REQUESTS") {
            config.sync.max_requests = v;
        }
        if let Some(v) = env_parse("EVENTSYNC_WINDOW_SECS") {
            config.sync.window_secs = v;
        }
        if let Some(v) = env_parse("EVENTSYNC_CACHE_TTL_SECS") {
            config.sync.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("EVENTSYNC_REQUEST_TIMEOUT") {
            config.sync.request_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("EVENTSYNC_BASE_URL") {
            config.upstream.base_url = v;
        }
        if let Ok(v) = std::env::var("EVENTSYNC_DB_PATH") {
            config.database.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("EVENTSYNC_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("EVENTSYNC_LOG_FORMAT") {
            config.logging.format = v;
        }
        if let Ok(v) = std::env::var("EVENTSYNC_AREAS") {
            config.areas = v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<TargetArea>().map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()
                .context("Invalid EVENTSYNC_AREAS")?;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.areas.is_empty() {
            anyhow::bail!("at least one target area must be configured");
        }

        self.sync.validate()?;

        Url::parse(&self.upstream.base_url)
            .with_context(|| format!("invalid upstream.base_url: {}", self.upstream.base_url))?;

        if self.upstream.feed_max_retries == 0 || self.upstream.query_max_retries == 0 {
            anyhow::bail!("max_retries must be greater than 0");
        }

        let agents = self.upstream.user_agents.len();
        if agents > 0 && agents < MIN_USER_AGENTS {
            anyhow::bail!(
                "upstream.user_agents needs at least {MIN_USER_AGENTS} entries (got {agents}); leave it empty for the built-in pool"
            );
        }

        if self.upstream.query_page_size == 0 || self.upstream.max_events_per_area == 0 {
            anyhow::bail!("page and event limits must be greater than 0");
        }

        if self.database.path.as_os_str().is_empty() {
            anyhow::bail!("database.path must be set");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.sync.request_timeout()
    }
}

impl SyncConfig {
    fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            anyhow::bail!("max_requests must be greater than 0");
        }
        if self.window_secs == 0 {
            anyhow::bail!("window_secs must be greater than 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }
        if self.request_delay_min_ms > self.request_delay_max_ms
            || self.event_pause_min_ms > self.event_pause_max_ms
            || self.area_cooldown_min_ms > self.area_cooldown_max_ms
        {
            anyhow::bail!("delay ranges must have min <= max");
        }
        Ok(())
    }

    /// Fresh limiter for one run
    pub fn limiter(&self) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(
            self.max_requests,
            Duration::from_secs(self.window_secs),
            Duration::from_millis(self.window_margin_ms),
        )
    }

    /// Random pacing drawn from the configured ranges
    pub fn delay_policy(&self) -> RandomDelay {
        let range = |min: u64, max: u64| Duration::from_millis(min)..Duration::from_millis(max);
        RandomDelay {
            request_delay: range(self.request_delay_min_ms, self.request_delay_max_ms),
            event_pause: range(self.event_pause_min_ms, self.event_pause_max_ms),
            area_cooldown: range(self.area_cooldown_min_ms, self.area_cooldown_max_ms),
            jitter: Duration::from_millis(self.jitter_ms),
            block_jitter: Duration::from_millis(self.block_jitter_ms),
        }
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn feed_base_delay(&self) -> Duration {
        Duration::from_millis(self.feed_base_delay_ms)
    }

    #[must_use]
    pub fn query_base_delay(&self) -> Duration {
        Duration::from_millis(self.query_base_delay_ms)
    }

    /// `{base}/events/{area}/rss`
    pub fn feed_url(&self, area_key: &str) -> String {
        format!(
            "{}/events/{}/rss",
            self.base_url.trim_end_matches('/'),
            area_key
        )
    }

    /// `{base}/graphql`
    pub fn query_url(&self) -> String {
        format!("{}/graphql", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.areas.len(), 2);
        assert_eq!(config.sync.max_requests, 5);
        assert_eq!(config.sync.cache_ttl(), Duration::from_secs(1800));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.sync.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.areas.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sync.request_delay_min_ms = 5000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.upstream.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sync.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_user_agent_pool_size() {
        let mut config = Config::default();
        config.upstream.user_agents = vec!["agent/1".to_string(), "agent/2".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 5"), "{err}");

        config.upstream.user_agents = (1..=5).map(|i| format!("agent/{i}")).collect();
        assert!(config.validate().is_ok());

        config.upstream.user_agents.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_request_timeout_conversion() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_endpoint_urls() {
        let mut upstream = UpstreamConfig::default();
        upstream.base_url = "http://127.0.0.1:8080/".to_string();
        assert_eq!(
            upstream.feed_url("madrid"),
            "http://127.0.0.1:8080/events/madrid/rss"
        );
        assert_eq!(upstream.query_url(), "http://127.0.0.1:8080/graphql");
    }

    #[test]
    fn test_delay_policy_ranges() {
        let policy = SyncConfig::default().delay_policy();
        assert_eq!(policy.request_delay.start, Duration::from_secs(1));
        assert_eq!(policy.request_delay.end, Duration::from_secs(3));
        assert_eq!(policy.block_jitter, Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[sync]
max_requests = 3

[[areas]]
area_key = "berlin"
display_city = "Berlin"
display_country = "Germany"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.sync.max_requests, 3);
        assert_eq!(config.sync.window_secs, 3600);
        assert_eq!(config.areas, vec![TargetArea::new("berlin", "Berlin", "Germany")]);
        assert_eq!(config.upstream.base_url, "https://ra.co");
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(include_str!("../../config.example.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.areas, default_areas());
        assert_eq!(config.sync.area_cooldown_max_ms, 10_000);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(Config::from_file(Path::new("/nonexistent/eventsync.toml")).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("EVENTSYNC_MAX_REQUESTS", "7");
        std::env::set_var("EVENTSYNC_AREAS", "london:London:UK,paris:Paris:France");

        let config = Config::from_env().unwrap();
        assert_eq!(config.sync.max_requests, 7);
        assert_eq!(config.areas.len(), 2);
        assert_eq!(config.areas[1].display_city, "Paris");

        std::env::remove_var("EVENTSYNC_MAX_REQUESTS");
        std::env::remove_var("EVENTSYNC_AREAS");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_area() {
        std::env::set_var("EVENTSYNC_AREAS", "london");
        assert!(Config::from_env().is_err());
        std::env::remove_var("EVENTSYNC_AREAS");
    }
}
