//! Core data types: network status snapshots, priorities, and retry policies

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

/// Immutable snapshot of the current network conditions
///
/// Produced by the `NetworkMonitor` and replaced wholesale on every change.
/// Qualitative assessments (`quality`, `is_slow`) are derived on demand and
/// never stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkStatus {
    /// Coarse connectivity: can we reach the network at all
    pub is_online: bool,

    /// Effective connection type, when the platform reports one
    #[serde(default)]
    pub effective_type: Option<EffectiveType>,

    /// Estimated downlink bandwidth in Mbps
    #[serde(default)]
    pub downlink_mbps: Option<f64>,

    /// Estimated round-trip time in milliseconds
    #[serde(default)]
    pub rtt_ms: Option<u32>,

    /// Whether the user has requested reduced data usage
    #[serde(default)]
    pub save_data: Option<bool>,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        // Assume connectivity until an observer reports otherwise
        Self::online()
    }
}

impl NetworkStatus {
    /// An online status with no connection metadata
    pub fn online() -> Self {
        Self {
            is_online: true,
            effective_type: None,
            downlink_mbps: None,
            rtt_ms: None,
            save_data: None,
        }
    }

    /// An offline status
    pub fn offline() -> Self {
        Self {
            is_online: false,
            effective_type: None,
            downlink_mbps: None,
            rtt_ms: None,
            save_data: None,
        }
    }

    /// Derive the qualitative connection classification
    ///
    /// Offline beats everything; otherwise the effective type decides, with
    /// round-trip time as the fallback when the platform reports no type.
    /// With no metadata at all an online connection is assumed `Good`.
    pub fn quality(&self) -> ConnectionQuality {
        if !self.is_online {
            return ConnectionQuality::Offline;
        }

        if let Some(effective_type) = self.effective_type {
            return match effective_type {
                EffectiveType::FourG => ConnectionQuality::Excellent,
                EffectiveType::ThreeG => ConnectionQuality::Good,
                EffectiveType::TwoG | EffectiveType::SlowTwoG => ConnectionQuality::Poor,
            };
        }

        match self.rtt_ms {
            Some(rtt) if rtt < 100 => ConnectionQuality::Excellent,
            Some(rtt) if rtt < 300 => ConnectionQuality::Good,
            Some(_) => ConnectionQuality::Poor,
            None => ConnectionQuality::Good,
        }
    }

    /// Whether the connection should be treated as slow
    ///
    /// Slow: 2g-class effective type, under 1 Mbps downlink, or RTT above
    /// 500ms.
    pub fn is_slow(&self) -> bool {
        if matches!(
            self.effective_type,
            Some(EffectiveType::TwoG) | Some(EffectiveType::SlowTwoG)
        ) {
            return true;
        }
        if matches!(self.downlink_mbps, Some(mbps) if mbps < 1.0) {
            return true;
        }
        matches!(self.rtt_ms, Some(rtt) if rtt > 500)
    }
}

/// Effective connection type as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "4g")]
    FourG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "slow-2g")]
    SlowTwoG,
}

/// Qualitative connection classification derived from a status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Offline,
}

/// Priority of a deferred request
///
/// Lower rank drains first: critical < high < normal < low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Ordering key: lower rank drains first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    /// All priorities in drain order
    pub fn all() -> [Priority; 4] {
        [
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low,
        ]
    }
}

/// Retry policy for a network operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Base of the exponential backoff curve
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds (cap, applied before jitter clamping)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Whether to apply +/-25% random jitter to computed delays
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            strategy: RetryStrategy::default(),
            exponential_base: default_exponential_base(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_exponential_base() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_jitter() -> bool {
    true
}

impl RetryPolicy {
    /// Preset for must-succeed operations: more retries, tight delays
    pub fn critical() -> Self {
        Self {
            max_retries: 5,
            strategy: RetryStrategy::ExponentialBackoff,
            exponential_base: 2.0,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter: true,
        }
    }

    /// Preset for background work: patient, widely spaced retries
    pub fn background() -> Self {
        Self {
            max_retries: 8,
            strategy: RetryStrategy::ExponentialBackoff,
            exponential_base: 2.0,
            initial_delay_ms: 5_000,
            max_delay_ms: 300_000,
            jitter: true,
        }
    }

    /// Preset for latency-sensitive operations: one quick retry, no jitter
    pub fn realtime() -> Self {
        Self {
            max_retries: 1,
            strategy: RetryStrategy::ExponentialBackoff,
            exponential_base: 2.0,
            initial_delay_ms: 250,
            max_delay_ms: 1_000,
            jitter: false,
        }
    }

    /// Total attempts this policy allows (initial attempt plus retries)
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Validate policy invariants
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(NetError::config(format!(
                "initial delay {}ms exceeds max delay {}ms",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        if self.exponential_base <= 1.0 {
            return Err(NetError::config(format!(
                "exponential base must be greater than 1.0, got {}",
                self.exponential_base
            )));
        }
        Ok(())
    }
}

/// Retry backoff strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// No delay between retries
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}

/// Named retry presets
///
/// The default policy applies when a submission names no preset; named
/// entries can be extended or overridden through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPresets {
    /// Policy used when no preset is named
    #[serde(default)]
    pub default: RetryPolicy,

    /// Named policies selectable per submission
    #[serde(default = "default_presets")]
    pub presets: HashMap<String, RetryPolicy>,
}

impl Default for RetryPresets {
    fn default() -> Self {
        Self {
            default: RetryPolicy::default(),
            presets: default_presets(),
        }
    }
}

fn default_presets() -> HashMap<String, RetryPolicy> {
    let mut presets = HashMap::new();
    presets.insert("critical".to_string(), RetryPolicy::critical());
    presets.insert("background".to_string(), RetryPolicy::background());
    presets.insert("realtime".to_string(), RetryPolicy::realtime());
    presets
}

impl RetryPresets {
    /// Look up a preset by name
    ///
    /// `"default"` always resolves to the default policy.
    pub fn get(&self, name: &str) -> Option<&RetryPolicy> {
        if name == "default" {
            return Some(&self.default);
        }
        self.presets.get(name)
    }

    /// Validate every policy in the preset table
    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for policy in self.presets.values() {
            policy.validate()?;
        }
        Ok(())
    }
}
