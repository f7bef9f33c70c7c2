// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for the scheduler lifecycle, tick execution, and dynamic API.

use async_trait::async_trait;
use dephealth_check::{CheckError, Probe};
use dephealth_core::{
    CheckConfig, DepHealthError, Dependency, DependencyType, Endpoint, ErrorKind, StatusCategory,
};
use dephealth_metrics::MetricsExporter;
use dephealth_scheduler::Scheduler;
use prometheus::Registry;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Helpers ─────────────────────────────────────────────────────────

/// Replays a script of outcomes, then repeats `fallback`.
struct ScriptedProbe {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: AtomicUsize,
}

#[derive(Clone, Copy)]
enum Outcome {
    Pass,
    Fail,
    Panic,
}

impl ScriptedProbe {
    fn new(script: impl IntoIterator<Item = Outcome>, fallback: Outcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    fn passing() -> Arc<Self> {
        Self::new([], Outcome::Pass)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn check(&self, _endpoint: &Endpoint, _timeout: Duration) -> Result<(), CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        match next {
            Outcome::Pass => Ok(()),
            Outcome::Fail => Err(CheckError::HttpStatus(500)),
            Outcome::Panic => panic!("probe bug"),
        }
    }

    fn dependency_type(&self) -> DependencyType {
        DependencyType::Http
    }
}

fn config(failure_threshold: u32) -> CheckConfig {
    CheckConfig::builder()
        .interval(Duration::from_secs(1))
        .timeout(Duration::from_millis(500))
        .initial_delay(Duration::ZERO)
        .failure_threshold(failure_threshold)
        .build()
        .unwrap()
}

fn scheduler(registry: &Registry) -> Scheduler {
    let exporter = MetricsExporter::new(registry, "app", "team", Vec::<String>::new()).unwrap();
    Scheduler::new(Arc::new(exporter), config(1))
}

fn dependency(name: &str, hosts: &[&str], cfg: CheckConfig) -> Dependency {
    Dependency::builder(name, DependencyType::Http)
        .critical(true)
        .endpoints(hosts.iter().map(|h| Endpoint::new(*h, "80")))
        .config(cfg)
        .build()
        .unwrap()
}

fn series_for(registry: &Registry, host: &str) -> usize {
    registry
        .gather()
        .iter()
        .flat_map(|f| f.get_metric().iter())
        .filter(|m| {
            m.get_label()
                .iter()
                .any(|l| l.get_name() == "host" && l.get_value() == host)
        })
        .count()
}

fn health_gauge(registry: &Registry, host: &str) -> Option<f64> {
    registry
        .gather()
        .iter()
        .find(|f| f.get_name() == "app_dependency_health")?
        .get_metric()
        .iter()
        .find(|m| {
            m.get_label()
                .iter()
                .any(|l| l.get_name() == "host" && l.get_value() == host)
        })
        .map(|m| m.get_gauge().get_value())
}

async fn ticks(n: u32) {
    tokio::time::sleep(Duration::from_millis(1000 * u64::from(n) + 10)).await;
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[test]
fn start_outside_runtime_is_state_error() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    assert_eq!(s.start().unwrap_err().kind(), ErrorKind::State);
    assert!(!s.is_started());
}

#[tokio::test(start_paused = true)]
async fn start_twice_fails() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.start().unwrap();
    assert_eq!(s.start().unwrap_err().kind(), ErrorKind::State);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn add_dependency_after_start_fails() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.start().unwrap();
    let err = s
        .add_dependency(&dependency("api", &["a"], config(1)), ScriptedProbe::passing())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn empty_registry_starts_with_one_worker() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.start().unwrap();
    assert_eq!(s.worker_count(), 1);
    assert!(s.health().is_empty());
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_endpoint_is_rejected_without_partial_effect() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.add_dependency(&dependency("api", &["a"], config(1)), ScriptedProbe::passing())
        .unwrap();
    let err = s
        .add_dependency(&dependency("api", &["b", "a"], config(1)), ScriptedProbe::passing())
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(s.endpoint_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_halts_checks() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    let probe = ScriptedProbe::passing();
    s.add_dependency(&dependency("api", &["a"], config(1)), probe.clone())
        .unwrap();
    s.start().unwrap();
    ticks(2).await;
    s.stop().await;
    s.stop().await;
    let calls = probe.calls();
    ticks(5).await;
    assert_eq!(probe.calls(), calls);
    assert!(s.is_stopped());
    assert_eq!(s.start().unwrap_err().kind(), ErrorKind::State);
}

// ── Tick execution ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unknown_endpoints_are_hidden_from_health_but_listed_in_details() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    let cfg = CheckConfig::builder()
        .interval(Duration::from_secs(10))
        .timeout(Duration::from_secs(1))
        .initial_delay(Duration::from_secs(60))
        .build()
        .unwrap();
    s.add_dependency(&dependency("api", &["a"], cfg), ScriptedProbe::passing())
        .unwrap();

    assert!(s.health().is_empty());
    let details = s.health_details();
    let status = &details["api:a:80"];
    assert_eq!(status.healthy, None);
    assert_eq!(status.status, StatusCategory::Unknown);
    assert_eq!(status.detail, "unknown");
    assert!(status.last_checked_at.is_none());
    assert_eq!(health_gauge(&registry, "a"), None);
}

#[tokio::test(start_paused = true)]
async fn first_tick_sets_health_and_metrics() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.add_dependency(&dependency("api", &["a", "b"], config(1)), ScriptedProbe::passing())
        .unwrap();
    s.start().unwrap();
    assert_eq!(s.worker_count(), 2);
    ticks(0).await;

    let health = s.health();
    assert_eq!(health.get("api:a:80"), Some(&true));
    assert_eq!(health.get("api:b:80"), Some(&true));
    assert_eq!(health_gauge(&registry, "a"), Some(1.0));
    assert_eq!(series_for(&registry, "a"), 11);
    let details = s.health_details();
    assert_eq!(details["api:a:80"].status, StatusCategory::Ok);
    assert!(details["api:a:80"].last_checked_at.is_some());
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn alternating_failures_below_threshold_stay_healthy() {
    use Outcome::*;
    let registry = Registry::new();
    let s = scheduler(&registry);
    let probe = ScriptedProbe::new([Pass, Fail, Pass, Fail, Pass], Pass);
    s.add_dependency(&dependency("api", &["a"], config(2)), probe.clone())
        .unwrap();
    s.start().unwrap();

    for _ in 0..5 {
        ticks(0).await;
        assert_eq!(health_gauge(&registry, "a"), Some(1.0));
        assert_eq!(s.health()["api:a:80"], true);
        tokio::time::sleep(Duration::from_millis(990)).await;
    }
    assert!(probe.calls() >= 5);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_flip_after_threshold() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    let probe = ScriptedProbe::new([Outcome::Pass], Outcome::Fail);
    s.add_dependency(&dependency("api", &["a"], config(3)), probe)
        .unwrap();
    s.start().unwrap();

    ticks(0).await;
    assert_eq!(s.health()["api:a:80"], true);
    ticks(2).await;
    assert_eq!(s.health()["api:a:80"], true);
    let details = s.health_details();
    assert_eq!(details["api:a:80"].status, StatusCategory::Unhealthy);
    assert_eq!(details["api:a:80"].detail, "http_500");
    ticks(1).await;
    assert_eq!(s.health()["api:a:80"], false);
    assert_eq!(health_gauge(&registry, "a"), Some(0.0));
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_probe_is_classified_and_loop_continues() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    let probe = ScriptedProbe::new([Outcome::Panic], Outcome::Pass);
    s.add_dependency(&dependency("api", &["a"], config(1)), probe.clone())
        .unwrap();
    s.start().unwrap();

    ticks(0).await;
    let details = s.health_details();
    assert_eq!(details["api:a:80"].status, StatusCategory::Error);
    assert_eq!(details["api:a:80"].detail, "error");
    assert_eq!(details["api:a:80"].healthy, Some(false));

    ticks(1).await;
    assert_eq!(s.health()["api:a:80"], true);
    assert!(probe.calls() >= 2);
    s.stop().await;
}

/// Takes three intervals per call and records the peak number of calls in
/// flight at once.
#[derive(Default)]
struct SlowProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Probe for SlowProbe {
    async fn check(&self, _endpoint: &Endpoint, _timeout: Duration) -> Result<(), CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn dependency_type(&self) -> DependencyType {
        DependencyType::Http
    }
}

#[tokio::test(start_paused = true)]
async fn checks_of_one_endpoint_never_overlap() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    let probe = Arc::new(SlowProbe::default());
    s.add_dependency(&dependency("api", &["slow"], config(1)), probe.clone())
        .unwrap();
    s.start().unwrap();

    // Ten intervals elapse; a check is always running.
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    let calls = probe.calls.load(Ordering::SeqCst);
    assert!((3..=4).contains(&calls), "calls = {calls}");
    assert_eq!(s.health()["api:slow:80"], true);
    s.stop().await;
}

// ── Dynamic API ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dynamic_ops_require_running_scheduler() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    let probe = ScriptedProbe::passing();
    let err = s
        .add_endpoint("api", DependencyType::Http, true, Endpoint::new("a", "80"), probe.clone())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(s.remove_endpoint("api", "a", "80").unwrap_err().kind(), ErrorKind::State);

    s.start().unwrap();
    s.stop().await;
    let err = s
        .add_endpoint("api", DependencyType::Http, true, Endpoint::new("a", "80"), probe.clone())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    s.remove_endpoint("api", "a", "80").unwrap();
}

#[tokio::test(start_paused = true)]
async fn add_endpoint_validates_input() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.start().unwrap();
    let probe = ScriptedProbe::passing();
    for (name, ep) in [
        ("Bad", Endpoint::new("a", "80")),
        ("api", Endpoint::new("a", "0")),
        ("api", Endpoint::new("", "80")),
        ("api", Endpoint::new("a", "80").with_label("port", "x")),
    ] {
        let err = s
            .add_endpoint(name, DependencyType::Http, false, ep, probe.clone())
            .unwrap_err();
        assert!(err.is_configuration());
    }
    assert_eq!(s.endpoint_count(), 0);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn add_is_idempotent_and_remove_cleans_metrics() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.start().unwrap();
    let probe = ScriptedProbe::passing();
    let ep = Endpoint::new("dyn", "8080");
    s.add_endpoint("api", DependencyType::Http, true, ep.clone(), probe.clone())
        .unwrap();
    s.add_endpoint("api", DependencyType::Http, true, ep, probe.clone())
        .unwrap();
    assert_eq!(s.endpoint_count(), 1);

    ticks(0).await;
    assert_eq!(series_for(&registry, "dyn"), 11);

    s.remove_endpoint("api", "dyn", "8080").unwrap();
    s.remove_endpoint("api", "dyn", "8080").unwrap();
    assert_eq!(series_for(&registry, "dyn"), 0);
    assert!(s.health_details().is_empty());

    let calls = probe.calls();
    ticks(3).await;
    assert_eq!(probe.calls(), calls);
    assert_eq!(series_for(&registry, "dyn"), 0);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn update_replaces_series_and_keeps_type_and_criticality() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.add_dependency(&dependency("api", &["old"], config(1)), ScriptedProbe::passing())
        .unwrap();
    s.start().unwrap();
    ticks(0).await;
    assert_eq!(series_for(&registry, "old"), 11);

    s.update_endpoint(
        "api",
        "old",
        "80",
        Endpoint::new("new", "81"),
        ScriptedProbe::passing(),
    )
    .unwrap();
    ticks(0).await;

    assert_eq!(series_for(&registry, "old"), 0);
    assert_eq!(series_for(&registry, "new"), 11);
    let details = s.health_details();
    assert_eq!(details.len(), 1);
    let status = &details["api:new:81"];
    assert_eq!(status.dep_type, DependencyType::Http);
    assert!(status.critical);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn update_of_missing_endpoint_is_not_found() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.start().unwrap();
    let err = s
        .update_endpoint("api", "x", "1", Endpoint::new("y", "2"), ScriptedProbe::passing())
        .unwrap_err();
    assert!(matches!(err, DepHealthError::EndpointNotFound { .. }));
    assert_eq!(s.endpoint_count(), 0);
    s.stop().await;
}

#[tokio::test(start_paused = true)]
async fn worker_pool_grows_with_dynamic_endpoints() {
    let registry = Registry::new();
    let s = scheduler(&registry);
    s.start().unwrap();
    for i in 0..4 {
        s.add_endpoint(
            "api",
            DependencyType::Http,
            false,
            Endpoint::new(format!("h{i}"), "80"),
            ScriptedProbe::passing(),
        )
        .unwrap();
    }
    assert_eq!(s.worker_count(), 4);
    s.remove_endpoint("api", "h0", "80").unwrap();
    assert_eq!(s.worker_count(), 4);
    s.stop().await;
}
