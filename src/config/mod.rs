//! # Orchestration Configuration
//!
//! Typed configuration for the coordination store, the scheduling pass, the
//! monitor beat, the watchdog and the indexing supervisor. Every section has
//! working defaults so an empty file (or no file at all) yields a usable
//! single-process setup on the in-memory store.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docsync_orchestrator::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new("config/orchestration.toml").load()?;
//! println!("monitor beat every {}s", config.monitor.beat_interval_seconds);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub coordination: CoordinationConfig,
    pub scheduling: SchedulingConfig,
    pub monitor: MonitorConfig,
    pub watchdog: WatchdogConfig,
    pub indexing: IndexingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub backend: CoordinationBackend,
    pub redis: RedisConfig,
    /// Key namespace; every key is stored as `{tenant_id}:{key}` when set
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout_seconds: 5,
        }
    }
}

/// Scheduling pass ("should this resource get a new campaign?")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub interval_seconds: u64,
    pub lock_timeout_seconds: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 15,
            lock_timeout_seconds: 120,
        }
    }
}

impl SchedulingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub beat_interval_seconds: u64,
    pub lock_timeout_seconds: u64,
    /// Cooperative time budget for one beat; remaining fences wait for the next beat
    pub soft_time_limit_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            beat_interval_seconds: 15,
            lock_timeout_seconds: 120,
            soft_time_limit_seconds: 300,
        }
    }
}

impl MonitorConfig {
    pub fn beat_interval(&self) -> Duration {
        Duration::from_secs(self.beat_interval_seconds)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    pub fn soft_time_limit(&self) -> Duration {
        Duration::from_secs(self.soft_time_limit_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    /// Minimum spacing between two validation passes (throttle window)
    pub interval_seconds: u64,
    /// TTL of the per-campaign liveness key
    pub liveness_ttl_seconds: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
            liveness_ttl_seconds: 300,
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn liveness_ttl(&self) -> Duration {
        Duration::from_secs(self.liveness_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub poll_interval_seconds: u64,
    pub termination_ttl_seconds: u64,
    /// Accept a non-zero child exit when the child reported success through
    /// the completion signal. Off by default: the exit code decides.
    pub tolerate_nonzero_exit_with_completion: bool,
    pub program: String,
    pub args: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            termination_ttl_seconds: 600,
            tolerate_nonzero_exit_with_completion: false,
            program: "docsync-indexer".to_string(),
            args: Vec::new(),
        }
    }
}

impl IndexingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn termination_ttl(&self) -> Duration {
        Duration::from_secs(self.termination_ttl_seconds)
    }
}

fn require_positive(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigurationError::invalid_value(
            field,
            "0",
            "must be greater than 0",
        ));
    }
    Ok(())
}

impl OrchestrationConfig {
    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> ConfigResult<()> {
        if self.coordination.backend == CoordinationBackend::Redis
            && self.coordination.redis.url.trim().is_empty()
        {
            return Err(ConfigurationError::missing_required_field(
                "coordination.redis.url",
                "redis coordination backend",
            ));
        }
        require_positive(
            "coordination.redis.connection_timeout_seconds",
            self.coordination.redis.connection_timeout_seconds,
        )?;

        require_positive("scheduling.interval_seconds", self.scheduling.interval_seconds)?;
        require_positive(
            "scheduling.lock_timeout_seconds",
            self.scheduling.lock_timeout_seconds,
        )?;
        require_positive("monitor.beat_interval_seconds", self.monitor.beat_interval_seconds)?;
        require_positive("monitor.lock_timeout_seconds", self.monitor.lock_timeout_seconds)?;
        require_positive(
            "monitor.soft_time_limit_seconds",
            self.monitor.soft_time_limit_seconds,
        )?;
        require_positive("watchdog.interval_seconds", self.watchdog.interval_seconds)?;
        require_positive(
            "watchdog.liveness_ttl_seconds",
            self.watchdog.liveness_ttl_seconds,
        )?;
        require_positive(
            "indexing.poll_interval_seconds",
            self.indexing.poll_interval_seconds,
        )?;
        require_positive(
            "indexing.termination_ttl_seconds",
            self.indexing.termination_ttl_seconds,
        )?;

        // The watchdog refreshes liveness once per window
        if self.watchdog.liveness_ttl_seconds <= self.watchdog.interval_seconds {
            return Err(ConfigurationError::invalid_value(
                "watchdog.liveness_ttl_seconds",
                self.watchdog.liveness_ttl_seconds.to_string(),
                format!(
                    "must be longer than watchdog.interval_seconds ({})",
                    self.watchdog.interval_seconds
                ),
            ));
        }

        if self.indexing.program.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "indexing.program",
                "indexing configuration",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestrationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coordination.backend, CoordinationBackend::Memory);
        assert_eq!(config.indexing.poll_interval(), Duration::from_secs(5));
        assert!(!config.indexing.tolerate_nonzero_exit_with_completion);
    }

    #[test]
    fn test_liveness_ttl_must_outlast_watchdog_window() {
        let mut config = OrchestrationConfig::default();
        config.watchdog.liveness_ttl_seconds = config.watchdog.interval_seconds;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("watchdog.liveness_ttl_seconds"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = OrchestrationConfig::default();
        config.monitor.beat_interval_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let mut config = OrchestrationConfig::default();
        config.coordination.backend = CoordinationBackend::Redis;
        config.coordination.redis.url = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }
}
