use std::time::Duration;

use serde::{Deserialize, Deserializer, de};

use crate::{AimdSettings, Classifier, classify::DEFAULT_TRANSIENT_CODES};

const fn default_poll_interval() -> u64 {
    1
}

const fn default_floor() -> f64 {
    1.0
}

const fn default_recovery() -> u64 {
    300 // 5 minutes
}

/// Reject rates that would stall pacing
fn positive_rate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let rate = f64::deserialize(deserializer)?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(de::Error::custom(format!(
            "rate must be a positive number of messages per second, got {rate}"
        )))
    }
}

fn default_transient_codes() -> Vec<String> {
    DEFAULT_TRANSIENT_CODES.map(String::from).to_vec()
}

/// Configuration for job processing
///
/// # Examples
///
/// ```ron
/// delivery: (
///     poll_interval_secs: 1,
///     rate: (floor_per_sec: 1.0, recovery_secs: 300),
///     transient_codes: ["Throttling", "ServiceUnavailable"],
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeliveryConfig {
    /// How long to sleep when the queue is empty in forever mode (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub rate: RateConfig,

    /// Service error codes treated as throttling or unavailability
    #[serde(default = "default_transient_codes")]
    pub transient_codes: Vec<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            rate: RateConfig::default(),
            transient_codes: default_transient_codes(),
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.transient_codes.iter().cloned())
    }
}

/// Send-rate adaptation settings
///
/// The ceiling is not configured: it is the account quota reported by the
/// transmission service at the start of each job.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RateConfig {
    /// Lowest rate backoff can reach (messages per second, above zero)
    #[serde(default = "default_floor", deserialize_with = "positive_rate")]
    pub floor_per_sec: f64,

    /// Time to climb from the floor back to the ceiling (in seconds)
    #[serde(default = "default_recovery")]
    pub recovery_secs: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            floor_per_sec: default_floor(),
            recovery_secs: default_recovery(),
        }
    }
}

impl RateConfig {
    #[must_use]
    pub const fn settings(&self, ceiling: f64) -> AimdSettings {
        AimdSettings {
            ceiling,
            floor: self.floor_per_sec,
            recovery: Duration::from_secs(self.recovery_secs),
        }
    }
}
