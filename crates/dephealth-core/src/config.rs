// SPDX-License-Identifier: MIT OR Apache-2.0
//! Immutable per-dependency check configuration.

use crate::error::{DepHealthError, Result};
use std::time::Duration;

/// Default interval between checks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
/// Default probe deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default delay before the first check.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);
/// Default consecutive failures before an endpoint is declared unhealthy.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 1;
/// Default consecutive successes before an endpoint is declared healthy again.
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 1;

/// Smallest accepted interval.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
/// Largest accepted interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// Smallest accepted timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);
/// Largest accepted timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest accepted initial delay.
pub const MAX_INITIAL_DELAY: Duration = Duration::from_secs(5 * 60);
/// Smallest accepted threshold.
pub const MIN_THRESHOLD: u32 = 1;
/// Largest accepted threshold.
pub const MAX_THRESHOLD: u32 = 10;

/// Scheduling and hysteresis parameters for one dependency.
///
/// Only obtainable through [`CheckConfig::builder`] or [`Default`], so every
/// instance satisfies the range checks and `timeout < interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckConfig {
    interval: Duration,
    timeout: Duration,
    initial_delay: Duration,
    failure_threshold: u32,
    success_threshold: u32,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            initial_delay: DEFAULT_INITIAL_DELAY,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }
}

impl CheckConfig {
    /// Start a builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> CheckConfigBuilder {
        CheckConfigBuilder::default()
    }

    /// Time between the start of consecutive checks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadline handed to the probe.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay before the first check after start.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Consecutive failures that flip a healthy endpoint.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Consecutive successes that flip an unhealthy endpoint.
    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }

    fn validate(&self) -> Result<()> {
        check_range("interval", self.interval, MIN_INTERVAL, MAX_INTERVAL)?;
        check_range("timeout", self.timeout, MIN_TIMEOUT, MAX_TIMEOUT)?;
        check_range(
            "initial delay",
            self.initial_delay,
            Duration::ZERO,
            MAX_INITIAL_DELAY,
        )?;
        check_threshold("failure threshold", self.failure_threshold)?;
        check_threshold("success threshold", self.success_threshold)?;
        if self.timeout >= self.interval {
            return Err(DepHealthError::config(format!(
                "timeout ({:?}) must be less than interval ({:?})",
                self.timeout, self.interval
            )));
        }
        Ok(())
    }
}

fn check_range(what: &str, value: Duration, min: Duration, max: Duration) -> Result<()> {
    if value < min || value > max {
        return Err(DepHealthError::config(format!(
            "{what} must be between {min:?} and {max:?}, got {value:?}"
        )));
    }
    Ok(())
}

fn check_threshold(what: &str, value: u32) -> Result<()> {
    if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&value) {
        return Err(DepHealthError::config(format!(
            "{what} must be between {MIN_THRESHOLD} and {MAX_THRESHOLD}, got {value}"
        )));
    }
    Ok(())
}

/// Builder for [`CheckConfig`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct CheckConfigBuilder {
    interval: Option<Duration>,
    timeout: Option<Duration>,
    initial_delay: Option<Duration>,
    failure_threshold: Option<u32>,
    success_threshold: Option<u32>,
}

impl CheckConfigBuilder {
    /// Set the check interval.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the probe deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the delay before the first check.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the failure threshold.
    #[must_use]
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = Some(n);
        self
    }

    /// Set the success threshold.
    #[must_use]
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = Some(n);
        self
    }

    /// Validate and freeze.
    ///
    /// # Errors
    ///
    /// Returns [`DepHealthError::Configuration`] when a value is out of range
    /// or when `timeout >= interval`.
    pub fn build(self) -> Result<CheckConfig> {
        let config = CheckConfig {
            interval: self.interval.unwrap_or(DEFAULT_INTERVAL),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            initial_delay: self.initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY),
            failure_threshold: self.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD),
            success_threshold: self.success_threshold.unwrap_or(DEFAULT_SUCCESS_THRESHOLD),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let c = CheckConfig::default();
        assert_eq!(c.interval(), Duration::from_secs(15));
        assert_eq!(c.timeout(), Duration::from_secs(5));
        assert_eq!(c.initial_delay(), Duration::from_secs(5));
        assert_eq!(c.failure_threshold(), 1);
        assert_eq!(c.success_threshold(), 1);
    }

    #[test]
    fn default_builder_matches_default() {
        assert_eq!(CheckConfig::builder().build().unwrap(), CheckConfig::default());
    }

    #[test]
    fn timeout_equal_to_interval_is_rejected() {
        let err = CheckConfig::builder()
            .interval(Duration::from_secs(2))
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("less than interval"));
    }

    #[test]
    fn boundaries_are_inclusive() {
        let c = CheckConfig::builder()
            .interval(MIN_INTERVAL)
            .timeout(MIN_TIMEOUT)
            .initial_delay(Duration::ZERO)
            .failure_threshold(MAX_THRESHOLD)
            .success_threshold(MIN_THRESHOLD)
            .build()
            .unwrap();
        assert_eq!(c.interval(), MIN_INTERVAL);

        CheckConfig::builder()
            .interval(MAX_INTERVAL)
            .timeout(MAX_TIMEOUT)
            .initial_delay(MAX_INITIAL_DELAY)
            .build()
            .unwrap();
    }

    #[test]
    fn initial_delay_over_limit_is_rejected() {
        assert!(
            CheckConfig::builder()
                .initial_delay(MAX_INITIAL_DELAY + Duration::from_millis(1))
                .build()
                .is_err()
        );
    }

    #[test]
    fn zero_threshold_is_rejected() {
        assert!(CheckConfig::builder().success_threshold(0).build().is_err());
    }
}
