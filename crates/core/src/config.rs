use crate::error::{TargetingError, TargetingResult};
use serde::Deserialize;
use std::time::Duration;

/// Root engine configuration. Loaded from environment variables
/// with the prefix `TARGETING_ENGINE__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Budget for a whole targeting decision across all matchers.
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
    /// Hard limit applied to matchers that do not declare their own.
    #[serde(default = "default_matcher_timeout_ms")]
    pub default_matcher_timeout_ms: u64,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    /// Per-matcher overrides applied at registration. Empty means
    /// every built-in matcher is registered with its own defaults.
    #[serde(default)]
    pub matchers: Vec<MatcherSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherSettings {
    pub id: String,
    #[serde(default = "default_matcher_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub stale_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

// Default functions
fn default_node_id() -> String {
    "targeting-01".to_string()
}
fn default_overall_timeout_ms() -> u64 {
    50
}
fn default_matcher_timeout_ms() -> u64 {
    20
}
fn default_cache_enabled() -> bool {
    true
}
fn default_matcher_enabled() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_cache_max_entries() -> usize {
    100_000
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            overall_timeout_ms: default_overall_timeout_ms(),
            default_matcher_timeout_ms: default_matcher_timeout_ms(),
            cache_enabled: default_cache_enabled(),
            matchers: Vec::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            stale_secs: 0,
            max_entries: default_cache_max_entries(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            matching: MatchingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl MatchingConfig {
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    pub fn default_matcher_timeout(&self) -> Duration {
        Duration::from_millis(self.default_matcher_timeout_ms)
    }

    pub fn settings_for(&self, matcher_id: &str) -> Option<&MatcherSettings> {
        self.matchers.iter().find(|m| m.id == matcher_id)
    }
}

impl EngineConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(path: Option<&str>) -> TargetingResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("TARGETING_ENGINE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| TargetingError::Config(e.to_string()))
    }
}
