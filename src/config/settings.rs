//! Engine configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetch::breaker::BreakerConfig;

/// Request cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Default time-to-live for cached batches, in seconds.
    pub default_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 120,
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Failures within the window that trip the breaker.
    pub failure_threshold: usize,
    /// Sliding failure window, in seconds.
    pub window_secs: u64,
    /// Cooldown before the first recovery probe, in seconds.
    pub cooldown_secs: u64,
    /// Upper bound for the backed-off cooldown, in seconds.
    pub max_cooldown_secs: u64,
    /// Per-call timeout, in seconds.
    pub call_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_secs: 60,
            cooldown_secs: 30,
            max_cooldown_secs: 300,
            call_timeout_secs: 10,
        }
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Sprint length used when starting a sprint without an explicit length.
    #[serde(default = "default_sprint_length")]
    pub default_sprint_length_weeks: u8,
    /// Coarse timeout bounding a whole multi-entity dashboard load, in
    /// seconds.
    #[serde(default = "default_view_timeout")]
    pub view_timeout_secs: u64,
    /// Request cache tuning.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Circuit breaker tuning.
    #[serde(default)]
    pub breaker: BreakerSettings,
}

const fn default_sprint_length() -> u8 {
    2
}

const fn default_view_timeout() -> u64 {
    30
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_sprint_length_weeks: default_sprint_length(),
            view_timeout_secs: default_view_timeout(),
            cache: CacheSettings::default(),
            breaker: BreakerSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// A human-readable description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=4).contains(&self.default_sprint_length_weeks) {
            return Err("default_sprint_length_weeks must be between 1 and 4".into());
        }
        if self.view_timeout_secs == 0 {
            return Err("view_timeout_secs must be greater than 0".into());
        }
        if self.cache.default_ttl_secs == 0 {
            return Err("cache.default_ttl_secs must be greater than 0".into());
        }
        if self.breaker.failure_threshold == 0 {
            return Err("breaker.failure_threshold must be greater than 0".into());
        }
        if self.breaker.window_secs == 0 {
            return Err("breaker.window_secs must be greater than 0".into());
        }
        if self.breaker.cooldown_secs == 0 {
            return Err("breaker.cooldown_secs must be greater than 0".into());
        }
        if self.breaker.max_cooldown_secs < self.breaker.cooldown_secs {
            return Err("breaker.max_cooldown_secs must be >= breaker.cooldown_secs".into());
        }
        if self.breaker.call_timeout_secs == 0 {
            return Err("breaker.call_timeout_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse errors or validation failures as a human-readable string.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let settings: Self =
            serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Build settings from defaults plus `SPRINTGRID_*` environment
    /// overrides, loading a `.env` file first when one exists. Unparseable
    /// overrides are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut settings = Self::default();
        if let Some(weeks) = env_parse("SPRINTGRID_SPRINT_LENGTH_WEEKS") {
            settings.default_sprint_length_weeks = weeks;
        }
        if let Some(secs) = env_parse("SPRINTGRID_VIEW_TIMEOUT_SECS") {
            settings.view_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("SPRINTGRID_CACHE_TTL_SECS") {
            settings.cache.default_ttl_secs = secs;
        }
        if let Some(threshold) = env_parse("SPRINTGRID_BREAKER_THRESHOLD") {
            settings.breaker.failure_threshold = threshold;
        }
        if let Some(secs) = env_parse("SPRINTGRID_BREAKER_COOLDOWN_SECS") {
            settings.breaker.cooldown_secs = secs;
        }
        settings
    }

    /// Breaker configuration derived from these settings.
    #[must_use]
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            window: Duration::from_secs(self.breaker.window_secs),
            cooldown: Duration::from_secs(self.breaker.cooldown_secs),
            max_cooldown: Duration::from_secs(self.breaker.max_cooldown_secs),
            call_timeout: Duration::from_secs(self.breaker.call_timeout_secs),
        }
    }

    /// Default cache TTL as a [`Duration`].
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }

    /// Whole-view load timeout as a [`Duration`].
    #[must_use]
    pub const fn view_timeout(&self) -> Duration {
        Duration::from_secs(self.view_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
