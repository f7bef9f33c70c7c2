// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-endpoint health record with hysteresis.

use crate::cancel::{CancelReason, CancellationToken};
use chrono::{DateTime, Utc};
use dephealth_core::{CheckResult, EndpointIdentity, EndpointStatus};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tri-valued health of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HealthState {
    /// No check has completed yet.
    #[default]
    Unknown,
    /// Up.
    Healthy,
    /// Down.
    Unhealthy,
}

impl HealthState {
    /// `None` for unknown, otherwise whether the endpoint is up.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Healthy => Some(true),
            Self::Unhealthy => Some(false),
        }
    }
}

/// Health before and after one recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Health before the outcome.
    pub from: HealthState,
    /// Health after the outcome.
    pub to: HealthState,
}

impl Transition {
    /// `true` when the health changed.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Known-healthy endpoint went down.
    pub fn became_unhealthy(&self) -> bool {
        self.from == HealthState::Healthy && self.to == HealthState::Unhealthy
    }

    /// Known-unhealthy endpoint came back.
    pub fn recovered(&self) -> bool {
        self.from == HealthState::Unhealthy && self.to == HealthState::Healthy
    }
}

#[derive(Debug, Clone, Default)]
struct Record {
    health: HealthState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_result: Option<CheckResult>,
    last_latency: Duration,
    last_checked_at: Option<DateTime<Utc>>,
}

/// The cancellation token and task of an endpoint's check loop.
#[derive(Debug)]
pub struct ScheduleHandle {
    /// Stops the loop before its next tick.
    pub token: CancellationToken,
    /// The spawned loop.
    pub task: JoinHandle<()>,
}

/// Mutable state of one registered endpoint.
///
/// The identity is fixed at registration; everything else sits behind a
/// mutex and is updated once per completed check.
#[derive(Debug)]
pub struct EndpointState {
    identity: EndpointIdentity,
    key: String,
    record: Mutex<Record>,
    handle: Mutex<Option<ScheduleHandle>>,
}

impl EndpointState {
    /// A state in [`HealthState::Unknown`] with no schedule attached.
    pub fn new(identity: EndpointIdentity) -> Self {
        let key = identity.key();
        Self {
            identity,
            key,
            record: Mutex::new(Record::default()),
            handle: Mutex::new(None),
        }
    }

    /// Static identifying fields.
    pub fn identity(&self) -> &EndpointIdentity {
        &self.identity
    }

    /// Registry key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current health.
    pub fn health(&self) -> HealthState {
        lock(&self.record).health
    }

    /// `(consecutive_successes, consecutive_failures)`.
    pub fn counters(&self) -> (u32, u32) {
        let r = lock(&self.record);
        (r.consecutive_successes, r.consecutive_failures)
    }

    /// Last stored classification, if any check completed.
    pub fn last_result(&self) -> Option<CheckResult> {
        lock(&self.record).last_result.clone()
    }

    /// Count a success. Leaves unknown immediately; leaves unhealthy once
    /// `success_threshold` consecutive successes are seen.
    pub fn record_success(&self, success_threshold: u32) -> Transition {
        let mut r = lock(&self.record);
        let from = r.health;
        r.consecutive_failures = 0;
        r.consecutive_successes = r.consecutive_successes.saturating_add(1);
        r.health = match from {
            HealthState::Unknown => HealthState::Healthy,
            HealthState::Unhealthy if r.consecutive_successes >= success_threshold => {
                HealthState::Healthy
            }
            other => other,
        };
        Transition { from, to: r.health }
    }

    /// Count a failure. Leaves unknown immediately; leaves healthy once
    /// `failure_threshold` consecutive failures are seen.
    pub fn record_failure(&self, failure_threshold: u32) -> Transition {
        let mut r = lock(&self.record);
        let from = r.health;
        r.consecutive_successes = 0;
        r.consecutive_failures = r.consecutive_failures.saturating_add(1);
        r.health = match from {
            HealthState::Unknown => HealthState::Unhealthy,
            HealthState::Healthy if r.consecutive_failures >= failure_threshold => {
                HealthState::Unhealthy
            }
            other => other,
        };
        Transition { from, to: r.health }
    }

    /// Store the classification, latency, and completion time of a check.
    /// Returns the previously stored classification.
    pub fn store_result(
        &self,
        result: CheckResult,
        latency: Duration,
        at: DateTime<Utc>,
    ) -> Option<CheckResult> {
        let mut r = lock(&self.record);
        r.last_latency = latency;
        r.last_checked_at = Some(at);
        r.last_result.replace(result)
    }

    /// Read-only projection for callers.
    pub fn snapshot(&self) -> EndpointStatus {
        let r = lock(&self.record);
        let mut status = EndpointStatus::unknown(&self.identity);
        if let (Some(healthy), Some(result)) = (r.health.as_bool(), &r.last_result) {
            status.healthy = Some(healthy);
            status.status = result.category;
            status.detail = result.detail.clone();
            status.latency = r.last_latency;
            status.last_checked_at = r.last_checked_at;
        }
        status
    }

    /// Attach the schedule. Replaces (and cancels) any previous one.
    pub fn attach(&self, handle: ScheduleHandle) {
        if let Some(old) = lock(&self.handle).replace(handle) {
            old.token.cancel(CancelReason::Removed);
        }
    }

    /// `true` while a schedule is attached.
    pub fn is_scheduled(&self) -> bool {
        lock(&self.handle).is_some()
    }

    /// Cancel and detach the schedule, returning it so the caller can wait
    /// for the loop to finish.
    pub fn cancel(&self, reason: CancelReason) -> Option<ScheduleHandle> {
        let handle = lock(&self.handle).take();
        if let Some(h) = &handle {
            h.token.cancel(reason);
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dephealth_core::{DependencyType, Endpoint, StatusCategory};

    fn state() -> EndpointState {
        EndpointState::new(EndpointIdentity::new(
            "api",
            DependencyType::Http,
            true,
            Endpoint::new("h", "80"),
        ))
    }

    #[test]
    fn first_outcome_leaves_unknown() {
        let s = state();
        let t = s.record_failure(3);
        assert_eq!(t.from, HealthState::Unknown);
        assert_eq!(t.to, HealthState::Unhealthy);

        let s = state();
        assert_eq!(s.record_success(5).to, HealthState::Healthy);
    }

    #[test]
    fn failure_threshold_applies_from_healthy() {
        let s = state();
        s.record_success(1);
        assert!(!s.record_failure(3).changed());
        assert!(!s.record_failure(3).changed());
        let t = s.record_failure(3);
        assert!(t.became_unhealthy());
        assert_eq!(s.counters(), (0, 3));
    }

    #[test]
    fn success_resets_failure_streak() {
        let s = state();
        s.record_success(1);
        s.record_failure(2);
        s.record_success(1);
        s.record_failure(2);
        assert_eq!(s.health(), HealthState::Healthy);
        assert_eq!(s.counters(), (0, 1));
    }

    #[test]
    fn success_threshold_applies_from_unhealthy() {
        let s = state();
        s.record_failure(1);
        assert!(!s.record_success(2).changed());
        assert!(s.record_success(2).recovered());
    }

    #[test]
    fn snapshot_before_and_after_first_check() {
        let s = state();
        let snap = s.snapshot();
        assert_eq!(snap.healthy, None);
        assert_eq!(snap.detail, "unknown");

        s.record_failure(1);
        s.store_result(
            CheckResult::new(StatusCategory::Unhealthy, "http_500"),
            Duration::from_millis(12),
            Utc::now(),
        );
        let snap = s.snapshot();
        assert_eq!(snap.healthy, Some(false));
        assert_eq!(snap.status, StatusCategory::Unhealthy);
        assert_eq!(snap.detail, "http_500");
        assert_eq!(snap.latency, Duration::from_millis(12));
        assert!(snap.last_checked_at.is_some());
    }

    #[test]
    fn store_result_returns_previous() {
        let s = state();
        assert!(s.store_result(CheckResult::ok(), Duration::ZERO, Utc::now()).is_none());
        let prev = s.store_result(CheckResult::fallback(), Duration::ZERO, Utc::now());
        assert_eq!(prev, Some(CheckResult::ok()));
    }
}
