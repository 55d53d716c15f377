/*!
 * Demonstration Harness Configuration
 *
 * Defaults reproduce the classic 100/100 scenario; every field can be
 * overridden from the environment.
 */

use crate::core::errors::ConfigError;
use std::time::Duration;

pub const ENV_EARLY_CALLERS: &str = "GATE_DEMO_A_CALLERS";
pub const ENV_LATE_CALLERS: &str = "GATE_DEMO_B_CALLERS";
pub const ENV_CLOSE_DELAY_US: &str = "GATE_DEMO_CLOSE_DELAY_US";
pub const ENV_TIMEOUT_MS: &str = "GATE_DEMO_TIMEOUT_MS";

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Callers that wait on the gate immediately (default: 100)
    pub early_callers: usize,

    /// Callers that wait on the trigger, then on the gate (default: 100)
    pub late_callers: usize,

    /// Race window between firing the trigger and closing again (default: 10µs)
    pub close_delay: Duration,

    /// Bound on each blocking phase before reporting a hang (default: 5s, must be non-zero)
    pub completion_timeout: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            early_callers: 100,
            late_callers: 100,
            close_delay: Duration::from_micros(10),
            completion_timeout: Duration::from_secs(5),
        }
    }
}

impl DemoConfig {
    /// Small, fast configuration for tests
    pub const fn quick() -> Self {
        Self {
            early_callers: 8,
            late_callers: 8,
            close_delay: Duration::from_micros(10),
            completion_timeout: Duration::from_secs(5),
        }
    }

    /// Read overrides from the environment on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; `None` keeps the default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(key)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidValue { key, value })
                })
                .transpose()
        };

        let count = |key: &'static str| -> Result<Option<usize>, ConfigError> {
            parse(key)?
                .map(|n| {
                    usize::try_from(n).map_err(|_| ConfigError::InvalidValue {
                        key,
                        value: n.to_string(),
                    })
                })
                .transpose()
        };

        // A zero timeout fails every run before a single caller can park
        let completion_timeout = match parse(ENV_TIMEOUT_MS)? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: ENV_TIMEOUT_MS,
                    value: "0".to_string(),
                })
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.completion_timeout,
        };

        Ok(Self {
            early_callers: count(ENV_EARLY_CALLERS)?.unwrap_or(defaults.early_callers),
            late_callers: count(ENV_LATE_CALLERS)?.unwrap_or(defaults.late_callers),
            close_delay: parse(ENV_CLOSE_DELAY_US)?
                .map_or(defaults.close_delay, Duration::from_micros),
            completion_timeout,
        })
    }

    pub fn total_callers(&self) -> usize {
        self.early_callers + self.late_callers
    }
}
