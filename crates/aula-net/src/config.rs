//! Runtime configuration for the network layer
//!
//! Deserialized from YAML with serde defaults, so a partial document (or none
//! at all) yields a fully usable configuration.

use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};
use crate::types::RetryPresets;

/// Configuration for the network resilience layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetConfig {
    /// Per-attempt deadline for requests, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Interval between periodic queue drains while online, in milliseconds
    #[serde(default = "default_drain_interval")]
    pub drain_interval_ms: u64,

    /// Pause between queued items during a drain, in milliseconds
    ///
    /// Keeps a reconnect from hammering the server with a burst of retries.
    #[serde(default = "default_drain_pacing")]
    pub drain_pacing_ms: u64,

    /// Retry policy presets
    #[serde(default)]
    pub retry: RetryPresets,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            drain_interval_ms: default_drain_interval(),
            drain_pacing_ms: default_drain_pacing(),
            retry: RetryPresets::default(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30_000
}
fn default_drain_interval() -> u64 {
    30_000
}
fn default_drain_pacing() -> u64 {
    100
}

impl NetConfig {
    /// Parse a configuration from a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: NetConfig = serde_yaml_ng::from_str(content)
            .map_err(|e| NetError::config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(NetError::config("request timeout must be non-zero"));
        }
        if self.drain_interval_ms == 0 {
            return Err(NetError::config("drain interval must be non-zero"));
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RetryStrategy;

    #[test]
    fn defaults_are_valid() {
        let config = NetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.drain_interval_ms, 30_000);
        assert_eq!(config.drain_pacing_ms, 100);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = NetConfig::from_yaml("{}").unwrap();
        assert_eq!(config.request_timeout_ms, 30_000);
        assert!(config.retry.get("critical").is_some());
    }

    #[test]
    fn partial_yaml_overrides() {
        let yaml = r#"
drain-interval-ms: 5000
retry:
  default:
    max-retries: 7
    initial-delay-ms: 200
"#;
        let config = NetConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.drain_interval_ms, 5000);
        assert_eq!(config.retry.default.max_retries, 7);
        assert_eq!(config.retry.default.initial_delay_ms, 200);
        // Untouched fields keep serde defaults
        assert_eq!(config.retry.default.strategy, RetryStrategy::ExponentialBackoff);
        assert_eq!(config.request_timeout_ms, 30_000);
    }

    #[test]
    fn invalid_policy_rejected() {
        let yaml = r#"
retry:
  default:
    initial-delay-ms: 9000
    max-delay-ms: 100
"#;
        let err = NetConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, NetError::Config { .. }));
    }

    #[test]
    fn malformed_yaml_rejected() {
        assert!(NetConfig::from_yaml(": not yaml :").is_err());
    }
}
