//! Daemon configuration.
//!
//! Settings come from an optional YAML file and are then overridden by
//! command-line flags.
//!
//! ```yaml
//! map_pin_path: /sys/fs/bpf/tc/globals/cali_v4_routes
//! apply_interval_ms: 100
//! resync_interval_secs: 300
//! retry_policy:
//!   per_key:
//!     max_attempts: 3
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default deferred-work cadence (milliseconds)
pub const DEFAULT_APPLY_INTERVAL_MS: u64 = 100;

/// Default bpffs pin of the route map
pub const DEFAULT_MAP_PIN_PATH: &str = "/sys/fs/bpf/tc/globals/cali_v4_routes";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// What the route manager does when a single key fails to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Schedule a full resync on the next pass.
    #[default]
    ResyncOnFailure,
    /// Retry just the failed key on following passes; escalate to a full
    /// resync after `max_attempts` consecutive failures of that key.
    PerKey { max_attempts: u32 },
}

/// Configuration for bpfroutesyncd.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteSyncConfig {
    /// bpffs path of the pinned route map.
    pub map_pin_path: PathBuf,
    /// How often deferred work is attempted.
    pub apply_interval_ms: u64,
    /// Forced full resync period; 0 disables periodic resyncs.
    pub resync_interval_secs: u64,
    /// Per-key failure handling.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub retry_policy: RetryPolicy,
    /// Use an in-memory map instead of the pinned kernel map.
    pub dry_run: bool,
}

impl Default for RouteSyncConfig {
    fn default() -> Self {
        Self {
            map_pin_path: PathBuf::from(DEFAULT_MAP_PIN_PATH),
            apply_interval_ms: DEFAULT_APPLY_INTERVAL_MS,
            resync_interval_secs: 0,
            retry_policy: RetryPolicy::default(),
            dry_run: false,
        }
    }
}

impl RouteSyncConfig {
    /// Loads and validates a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parses and validates YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apply_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "apply_interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if let RetryPolicy::PerKey { max_attempts: 0 } = self.retry_policy {
            return Err(ConfigError::Invalid {
                field: "retry_policy.per_key.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if !self.dry_run && self.map_pin_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "map_pin_path",
                message: "required unless dry_run is set".to_string(),
            });
        }
        Ok(())
    }

    pub fn apply_interval(&self) -> Duration {
        Duration::from_millis(self.apply_interval_ms)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}
