// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for the hysteresis state machine.

use dephealth_core::{DependencyType, Endpoint, EndpointIdentity};
use dephealth_scheduler::{EndpointState, HealthState};
use proptest::prelude::*;

fn fresh() -> EndpointState {
    EndpointState::new(EndpointIdentity::new(
        "svc",
        DependencyType::Tcp,
        false,
        Endpoint::new("h", "1"),
    ))
}

fn apply(state: &EndpointState, success: bool, threshold: u32) {
    if success {
        state.record_success(threshold);
    } else {
        state.record_failure(threshold);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn counters_are_never_both_positive(
        outcomes in prop::collection::vec(any::<bool>(), 1..64),
        fail_t in 1u32..=10,
        succ_t in 1u32..=10,
    ) {
        let s = fresh();
        for ok in outcomes {
            apply(&s, ok, if ok { succ_t } else { fail_t });
            let (succ, fail) = s.counters();
            prop_assert_eq!(succ * fail, 0);
        }
    }

    #[test]
    fn enough_failures_from_healthy_flip_to_unhealthy(fail_t in 1u32..=10, extra in 0u32..5) {
        let s = fresh();
        s.record_success(1);
        prop_assert_eq!(s.health(), HealthState::Healthy);
        for _ in 0..(fail_t + extra) {
            s.record_failure(fail_t);
        }
        prop_assert_eq!(s.health(), HealthState::Unhealthy);
    }

    #[test]
    fn fewer_failures_than_threshold_keep_healthy(fail_t in 2u32..=10) {
        let s = fresh();
        s.record_success(1);
        for _ in 0..(fail_t - 1) {
            s.record_failure(fail_t);
        }
        prop_assert_eq!(s.health(), HealthState::Healthy);
    }

    #[test]
    fn enough_successes_from_unhealthy_flip_to_healthy(succ_t in 1u32..=10, extra in 0u32..5) {
        let s = fresh();
        s.record_failure(1);
        prop_assert_eq!(s.health(), HealthState::Unhealthy);
        for _ in 0..(succ_t + extra) {
            s.record_success(succ_t);
        }
        prop_assert_eq!(s.health(), HealthState::Healthy);
    }

    #[test]
    fn one_observation_leaves_unknown(ok in any::<bool>(), threshold in 1u32..=10) {
        let s = fresh();
        prop_assert_eq!(s.health(), HealthState::Unknown);
        apply(&s, ok, threshold);
        let expected = if ok { HealthState::Healthy } else { HealthState::Unhealthy };
        prop_assert_eq!(s.health(), expected);
    }
}
