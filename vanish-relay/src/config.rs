//! Deployment configuration.

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest envelope lifetime a deployment may configure (one year).
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Tunables for one Vanish deployment. Missing JSON fields take their
/// defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VanishConfig {
    /// Envelope lifetime from `createdAt` to `expiresAt`.
    pub ttl_seconds: u64,

    /// How often the expiry sweeper purges expired rows. This is also the
    /// upper bound on how long an expired row stays on disk.
    pub sweep_interval_ms: u64,

    /// Period of the background history reconciliation.
    pub reconcile_interval_secs: u64,

    /// Attempts for a publish or store call before giving up.
    pub publish_max_attempts: u32,

    /// First retry delay; doubles on every further attempt.
    pub retry_base_delay_ms: u64,

    /// Base URL of the public key directory.
    pub directory_base_url: String,

    pub request_timeout_secs: u64,

    /// Pushed envelopes buffered per subscriber before new ones are dropped
    /// (they are still picked up by reconciliation).
    pub subscriber_buffer: usize,
}

impl Default for VanishConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 60,
            sweep_interval_ms: 1000,
            reconcile_interval_secs: 10,
            publish_max_attempts: 3,
            retry_base_delay_ms: 500,
            directory_base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 30,
            subscriber_buffer: 256,
        }
    }
}

impl VanishConfig {
    /// Loads and validates a JSON config file.
    pub fn from_json_file(path: &Path) -> RelayResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RelayResult<()> {
        let nonzero = [
            ("ttl_seconds", self.ttl_seconds),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("reconcile_interval_secs", self.reconcile_interval_secs),
            ("publish_max_attempts", u64::from(self.publish_max_attempts)),
            ("request_timeout_secs", self.request_timeout_secs),
            ("subscriber_buffer", self.subscriber_buffer as u64),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(RelayError::Config(format!("{name} must be greater than zero")));
        }
        if self.ttl_seconds > MAX_TTL_SECONDS {
            return Err(RelayError::Config(format!(
                "ttl_seconds must be at most {MAX_TTL_SECONDS}"
            )));
        }
        reqwest::Url::parse(&self.directory_base_url)
            .map_err(|e| RelayError::Config(format!("invalid directory_base_url: {e}")))?;
        Ok(())
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_seconds.min(MAX_TTL_SECONDS) as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
