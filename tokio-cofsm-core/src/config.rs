//! Runner configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::FsmError;

/// Tick rates for [`StateMachineRunner::drive`](crate::StateMachineRunner::drive).
///
/// Durations deserialize from humantime strings such as `"16ms"`:
///
/// ```rust
/// # use tokio_cofsm_core::RunnerConfig;
/// # use std::time::Duration;
/// let config: RunnerConfig =
///     serde_json::from_str(r#"{ "frame_interval": "10ms" }"#).unwrap();
/// assert_eq!(config.frame_interval, Duration::from_millis(10));
/// assert_eq!(config.fixed_interval, Duration::from_millis(20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Period of `Tick` + `LateTick`.
    #[serde(deserialize_with = "humantime_duration")]
    pub frame_interval: Duration,
    /// Period of `FixedTick`.
    #[serde(deserialize_with = "humantime_duration")]
    pub fixed_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            fixed_interval: Duration::from_millis(20),
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    #[must_use]
    pub fn with_fixed_interval(mut self, interval: Duration) -> Self {
        self.fixed_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), FsmError> {
        if self.frame_interval.is_zero() {
            return Err(FsmError::InvalidConfig("frame_interval must be non-zero"));
        }
        if self.fixed_interval.is_zero() {
            return Err(FsmError::InvalidConfig("fixed_interval must be non-zero"));
        }
        Ok(())
    }
}

fn humantime_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
