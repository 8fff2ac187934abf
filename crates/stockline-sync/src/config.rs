//! # Sync Configuration
//!
//! Configuration for the sync engine: where the authority lives, how long a
//! request may take, and how retries back off.
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! authority_url = "https://api.example.com"
//! request_timeout_secs = 30
//! max_attempts = 5
//! backoff_initial_ms = 1000
//! backoff_max_ms = 60000
//! poll_interval_secs = 30
//! ```
//!
//! Every knob has a serde default, so a partial file (or none at all) still
//! yields a working configuration.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote authority (endpoints hang off `/api/...`).
    pub authority_url: String,

    /// Bounded timeout for each remote call. A timeout counts as a network
    /// error and retries with backoff.
    pub request_timeout_secs: u64,

    /// Failed pushes per queue item before it is abandoned.
    pub max_attempts: u32,

    /// First retry delay.
    pub backoff_initial_ms: u64,

    /// Retry delay cap.
    pub backoff_max_ms: u64,

    /// Periodic drain interval.
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            authority_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            max_attempts: 5,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 60_000,
            poll_interval_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        let config: SyncConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading sync config");
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Rejects configurations that would misbehave at runtime.
    pub fn validate(&self) -> SyncResult<()> {
        if self.authority_url.trim().is_empty() {
            return Err(SyncError::InvalidConfig("authority_url is empty".into()));
        }
        url::Url::parse(&self.authority_url)
            .map_err(|e| SyncError::InvalidConfig(format!("authority_url: {e}")))?;
        if self.max_attempts == 0 {
            return Err(SyncError::InvalidConfig("max_attempts must be at least 1".into()));
        }
        if self.backoff_initial_ms == 0 {
            return Err(SyncError::InvalidConfig("backoff_initial_ms must be positive".into()));
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(SyncError::InvalidConfig(
                "backoff_max_ms must be >= backoff_initial_ms".into(),
            ));
        }
        Ok(())
    }

    /// The per-collection retry policy: exponential growth to a cap, full
    /// jitter, no overall deadline (the drain loop owns cancellation).
    /// Reset on every successful push.
    pub(crate) fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.backoff_initial_ms))
            .with_max_interval(Duration::from_millis(self.backoff_max_ms))
            .with_multiplier(2.0)
            .with_randomization_factor(1.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Per-request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff_initial_ms, 1_000);
        assert_eq!(config.backoff_max_ms, 60_000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            authority_url = "https://sync.example.com"
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.authority_url, "https://sync.example.com");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.poll_interval_secs, 30);
    }

    #[test]
    fn rejects_zero_max_attempts() {
        let err = SyncConfig::from_toml_str("max_attempts = 0").unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let err = SyncConfig::from_toml_str(
            r#"
            backoff_initial_ms = 5000
            backoff_max_ms = 1000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = SyncConfig::from_toml_str(r#"authority_url = "not a url""#).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn backoff_policy_respects_bounds() {
        use backoff::backoff::Backoff;

        let config = SyncConfig {
            backoff_initial_ms: 100,
            backoff_max_ms: 400,
            ..SyncConfig::default()
        };
        let mut policy = config.backoff_policy();

        // with full jitter every delay lands in [0, 2 * current_interval],
        // and current_interval itself never exceeds the cap
        for _ in 0..20 {
            let delay = policy.next_backoff().expect("no deadline configured");
            assert!(delay <= Duration::from_millis(800));
        }
    }
}
