//! Guard configuration.

use crate::{
    decision::BlockListMatching,
    error::{Error, Result},
};
use std::time::Duration;

/// Configuration shared by the guard and its directory cache.
///
/// `Guard::from_config` and `AsyncGuard::from_config` build the cache from
/// the same value; `with_config` rejects a cache whose settings differ.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persistence", serde(default))]
pub struct GuardConfig {
    /// Snapshot lifetime in seconds. `None` keeps a snapshot until it is invalidated.
    pub cache_ttl_seconds: Option<u64>,
    /// How block-list entries are matched against caller role identifiers.
    pub block_list_matching: BlockListMatching,
    /// Whether to record metrics.
    pub enable_metrics: bool,
    /// Upper bound on a single directory fetch, in milliseconds. Only the async
    /// guard can bound a fetch; the blocking guard rejects this setting.
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: None,
            block_list_matching: BlockListMatching::Substring,
            enable_metrics: true,
            fetch_timeout_ms: None,
        }
    }
}

impl GuardConfig {
    /// Check the configuration for values that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_seconds == Some(0) {
            return Err(Error::InvalidConfiguration(
                "cache_ttl_seconds must be greater than zero; use None to disable expiry"
                    .to_string(),
            ));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(Error::InvalidConfiguration(
                "fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot lifetime as a duration.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_seconds.map(Duration::from_secs)
    }

    /// Directory fetch timeout as a duration.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Load and validate a configuration from JSON.
    #[cfg(feature = "persistence")]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: GuardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for creating guard configurations.
///
/// # Examples
///
/// ```rust
/// use role_guard::config::GuardConfigBuilder;
/// use role_guard::decision::BlockListMatching;
///
/// let config = GuardConfigBuilder::new()
///     .cache_ttl_seconds(300)
///     .block_list_matching(BlockListMatching::Exact)
///     .build()?;
///
/// assert_eq!(config.cache_ttl_seconds, Some(300));
/// # Ok::<(), role_guard::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct GuardConfigBuilder {
    config: GuardConfig,
}

impl GuardConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: GuardConfig::default(),
        }
    }

    /// Expire snapshots after `seconds`.
    pub fn cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.cache_ttl_seconds = Some(seconds);
        self
    }

    /// Keep snapshots until explicitly invalidated.
    pub fn no_cache_expiry(mut self) -> Self {
        self.config.cache_ttl_seconds = None;
        self
    }

    /// Set the block-list matching rule.
    pub fn block_list_matching(mut self, matching: BlockListMatching) -> Self {
        self.config.block_list_matching = matching;
        self
    }

    /// Enable or disable metrics.
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.config.enable_metrics = enable;
        self
    }

    /// Bound directory fetches to `millis` milliseconds.
    pub fn fetch_timeout_ms(mut self, millis: u64) -> Self {
        self.config.fetch_timeout_ms = Some(millis);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<GuardConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
