// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for the series lifecycle maintained by `MetricsExporter`.

use dephealth_core::{DependencyType, Endpoint, EndpointIdentity, StatusCategory};
use dephealth_metrics::{
    HEALTH_METRIC, LATENCY_METRIC, MetricsExporter, STATUS_DETAIL_METRIC, STATUS_METRIC,
};
use prometheus::Registry;
use prometheus::proto::MetricFamily;
use std::collections::BTreeMap;
use std::time::Duration;

// ── Helpers ─────────────────────────────────────────────────────────

type Labels = BTreeMap<String, String>;

fn family<'a>(families: &'a [MetricFamily], name: &str) -> Option<&'a MetricFamily> {
    families.iter().find(|f| f.get_name() == name)
}

/// `(labels, gauge value)` for every gauge series of `name` on `host`.
fn gauges(registry: &Registry, name: &str, host: &str) -> Vec<(Labels, f64)> {
    let families = registry.gather();
    let Some(f) = family(&families, name) else {
        return Vec::new();
    };
    f.get_metric()
        .iter()
        .map(|m| {
            let labels: Labels = m
                .get_label()
                .iter()
                .map(|l| (l.get_name().to_string(), l.get_value().to_string()))
                .collect();
            (labels, m.get_gauge().get_value())
        })
        .filter(|(labels, _)| labels.get("host").map(String::as_str) == Some(host))
        .collect()
}

fn series_count(registry: &Registry, host: &str) -> usize {
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

fn identity(host: &str) -> EndpointIdentity {
    EndpointIdentity::new(
        "cache",
        DependencyType::Redis,
        false,
        Endpoint::new(host, "6379").with_label("zone", "eu"),
    )
}

fn exporter(registry: &Registry) -> MetricsExporter {
    MetricsExporter::new(registry, "checkout", "shop", ["zone", "env"]).unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn full_tick_creates_all_four_families() {
    let registry = Registry::new();
    let exp = exporter(&registry);
    let id = identity("r1");

    exp.set_health(&id, true);
    exp.observe_latency(&id, Duration::from_millis(3));
    exp.set_status(&id, StatusCategory::Ok);
    exp.set_status_detail(&id, "ok");

    let health = gauges(&registry, HEALTH_METRIC, "r1");
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].1, 1.0);
    let labels = &health[0].0;
    assert_eq!(labels["name"], "checkout");
    assert_eq!(labels["group"], "shop");
    assert_eq!(labels["dependency"], "cache");
    assert_eq!(labels["type"], "redis");
    assert_eq!(labels["port"], "6379");
    assert_eq!(labels["critical"], "no");
    assert_eq!(labels["zone"], "eu");
    assert_eq!(labels["env"], "");

    let families = registry.gather();
    let latency = family(&families, LATENCY_METRIC).unwrap();
    assert_eq!(latency.get_metric()[0].get_histogram().get_sample_count(), 1);

    // 4 families: 1 health + 1 histogram + 8 status + 1 detail.
    assert_eq!(series_count(&registry, "r1"), 11);
}

#[test]
fn status_enum_has_exactly_one_active_series() {
    let registry = Registry::new();
    let exp = exporter(&registry);
    let id = identity("r1");

    exp.set_status(&id, StatusCategory::Timeout);
    let series = gauges(&registry, STATUS_METRIC, "r1");
    assert_eq!(series.len(), 8);
    let active: Vec<_> = series.iter().filter(|(_, v)| *v == 1.0).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].0["status"], "timeout");

    exp.set_status(&id, StatusCategory::Ok);
    let series = gauges(&registry, STATUS_METRIC, "r1");
    let active: Vec<_> = series.iter().filter(|(_, v)| *v == 1.0).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].0["status"], "ok");
}

#[test]
fn detail_series_is_replaced_on_change() {
    let registry = Registry::new();
    let exp = exporter(&registry);
    let id = identity("r1");

    exp.set_status_detail(&id, "ok");
    exp.set_status_detail(&id, "ok");
    assert_eq!(gauges(&registry, STATUS_DETAIL_METRIC, "r1").len(), 1);

    exp.set_status_detail(&id, "http_503");
    let series = gauges(&registry, STATUS_DETAIL_METRIC, "r1");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].0["detail"], "http_503");
    assert_eq!(series[0].1, 1.0);
}

#[test]
fn delete_metrics_removes_every_series_of_one_endpoint() {
    let registry = Registry::new();
    let exp = exporter(&registry);
    for host in ["r1", "r2"] {
        let id = identity(host);
        exp.set_health(&id, false);
        exp.observe_latency(&id, Duration::from_millis(10));
        exp.set_status(&id, StatusCategory::ConnectionError);
        exp.set_status_detail(&id, "connection_refused");
    }

    exp.delete_metrics(&identity("r1"));
    assert_eq!(series_count(&registry, "r1"), 0);
    assert_eq!(series_count(&registry, "r2"), 11);
}

#[test]
fn delete_of_unknown_endpoint_is_a_no_op() {
    let registry = Registry::new();
    let exp = exporter(&registry);
    exp.delete_metrics(&identity("nowhere"));
    assert_eq!(series_count(&registry, "nowhere"), 0);
}
