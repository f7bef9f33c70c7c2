// SPDX-License-Identifier: MIT OR Apache-2.0
//! dephealth-metrics
//!
//! [`MetricsExporter`] owns the four metric families and creates, updates,
//! and deletes the series of each endpoint. Every series carries the base
//! label set `name, group, dependency, type, host, port, critical` followed
//! by the installation's custom label keys in alphabetical order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dephealth_core::{
    DepHealthError, EndpointIdentity, Result, StatusCategory, validate_label_name, validate_name,
};
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Health gauge name.
pub const HEALTH_METRIC: &str = "app_dependency_health";
/// Latency histogram name.
pub const LATENCY_METRIC: &str = "app_dependency_latency_seconds";
/// Status enum gauge name.
pub const STATUS_METRIC: &str = "app_dependency_status";
/// Status detail info gauge name.
pub const STATUS_DETAIL_METRIC: &str = "app_dependency_status_detail";

/// Latency histogram buckets, in seconds.
pub const LATENCY_BUCKETS: [f64; 8] = [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Base label names, in emission order.
pub const BASE_LABELS: [&str; 7] = [
    "name",
    "group",
    "dependency",
    "type",
    "host",
    "port",
    "critical",
];

const HEALTH_HELP: &str = "Health status of a dependency (1 = healthy, 0 = unhealthy)";
const LATENCY_HELP: &str = "Latency of dependency health check in seconds";
const STATUS_HELP: &str = "Category of the last check result";
const STATUS_DETAIL_HELP: &str = "Detailed reason of the last check result";

fn metrics_err(e: prometheus::Error) -> DepHealthError {
    DepHealthError::Metrics {
        reason: e.to_string(),
    }
}

/// Writes endpoint state into Prometheus series.
///
/// All methods are non-blocking apart from short internal locks. The
/// exporter remembers the current `detail` label of every endpoint so the
/// previous detail series can be dropped when it changes and so
/// [`delete_metrics`](Self::delete_metrics) needs no registry scan.
pub struct MetricsExporter {
    instance_name: String,
    instance_group: String,
    custom_labels: Vec<String>,
    health: GaugeVec,
    latency: HistogramVec,
    status: GaugeVec,
    status_detail: GaugeVec,
    details: DashMap<String, String>,
}

impl fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsExporter")
            .field("instance_name", &self.instance_name)
            .field("instance_group", &self.instance_group)
            .field("custom_labels", &self.custom_labels)
            .field("tracked_endpoints", &self.details.len())
            .finish()
    }
}

impl MetricsExporter {
    /// Create the four families and register them on `registry`.
    ///
    /// `custom_labels` is deduplicated and sorted; it fixes the label width
    /// for the lifetime of the exporter.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::Configuration`] for an invalid name, group, or label
    /// key; [`DepHealthError::Metrics`] when the registry already holds a
    /// collector with the same name.
    pub fn new<I, S>(registry: &Registry, name: &str, group: &str, custom_labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_name("instance name", name)?;
        validate_name("instance group", group)?;
        let custom: BTreeSet<String> = custom_labels.into_iter().map(Into::into).collect();
        for key in &custom {
            validate_label_name(key)?;
        }
        let custom_labels: Vec<String> = custom.into_iter().collect();

        let mut labels: Vec<&str> = BASE_LABELS.to_vec();
        labels.extend(custom_labels.iter().map(String::as_str));
        let with = |extra: &'static str| {
            let mut v = labels.clone();
            v.push(extra);
            v
        };

        let health = GaugeVec::new(Opts::new(HEALTH_METRIC, HEALTH_HELP), &labels).map_err(metrics_err)?;
        let latency = HistogramVec::new(
            HistogramOpts::new(LATENCY_METRIC, LATENCY_HELP).buckets(LATENCY_BUCKETS.to_vec()),
            &labels,
        )
        .map_err(metrics_err)?;
        let status =
            GaugeVec::new(Opts::new(STATUS_METRIC, STATUS_HELP), &with("status")).map_err(metrics_err)?;
        let status_detail = GaugeVec::new(
            Opts::new(STATUS_DETAIL_METRIC, STATUS_DETAIL_HELP),
            &with("detail"),
        )
        .map_err(metrics_err)?;

        registry.register(Box::new(health.clone())).map_err(metrics_err)?;
        registry.register(Box::new(latency.clone())).map_err(metrics_err)?;
        registry.register(Box::new(status.clone())).map_err(metrics_err)?;
        registry.register(Box::new(status_detail.clone())).map_err(metrics_err)?;

        Ok(Self {
            instance_name: name.to_string(),
            instance_group: group.to_string(),
            custom_labels,
            health,
            latency,
            status,
            status_detail,
            details: DashMap::new(),
        })
    }

    /// Application name emitted in the `name` label.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Application group emitted in the `group` label.
    pub fn instance_group(&self) -> &str {
        &self.instance_group
    }

    /// Custom label keys, sorted.
    pub fn custom_labels(&self) -> &[String] {
        &self.custom_labels
    }

    /// Base label values for `id`, with custom labels the endpoint lacks
    /// emitted as empty strings and keys outside the fixed set dropped.
    pub fn label_values(&self, id: &EndpointIdentity) -> Vec<String> {
        let mut values = vec![
            self.instance_name.clone(),
            self.instance_group.clone(),
            id.dependency.clone(),
            id.dep_type.as_str().to_string(),
            id.endpoint.host().to_string(),
            id.endpoint.port().to_string(),
            id.critical_label().to_string(),
        ];
        let labels = id.endpoint.labels();
        values.extend(
            self.custom_labels
                .iter()
                .map(|k| labels.get(k).cloned().unwrap_or_default()),
        );
        values
    }

    /// Set the health gauge to 1.0 or 0.0.
    pub fn set_health(&self, id: &EndpointIdentity, healthy: bool) {
        let values = self.label_values(id);
        self.health
            .with_label_values(&as_refs(&values))
            .set(if healthy { 1.0 } else { 0.0 });
    }

    /// Record one check duration.
    pub fn observe_latency(&self, id: &EndpointIdentity, latency: Duration) {
        let values = self.label_values(id);
        self.latency
            .with_label_values(&as_refs(&values))
            .observe(latency.as_secs_f64());
    }

    /// Set the status enum: 1.0 for `category`, 0.0 for the other seven.
    pub fn set_status(&self, id: &EndpointIdentity, category: StatusCategory) {
        let mut values = self.label_values(id);
        values.push(String::new());
        let last = values.len() - 1;
        for c in StatusCategory::REPORTED {
            values[last] = c.as_str().to_string();
            let v = if c == category { 1.0 } else { 0.0 };
            self.status.with_label_values(&as_refs(&values)).set(v);
        }
    }

    /// Point the detail info series at `detail`, dropping the previous one
    /// if the value changed.
    pub fn set_status_detail(&self, id: &EndpointIdentity, detail: &str) {
        let base = self.label_values(id);
        match self.details.entry(id.key()) {
            Entry::Occupied(mut current) => {
                if current.get() != detail {
                    let old = with_extra(&base, current.get());
                    let _ = self.status_detail.remove_label_values(&as_refs(&old));
                    current.insert(detail.to_string());
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(detail.to_string());
            }
        }
        let new = with_extra(&base, detail);
        self.status_detail.with_label_values(&as_refs(&new)).set(1.0);
    }

    /// Remove every series of `id`: health, latency, the eight status
    /// gauges, and the current detail gauge.
    pub fn delete_metrics(&self, id: &EndpointIdentity) {
        let base = self.label_values(id);
        let refs = as_refs(&base);
        let _ = self.health.remove_label_values(&refs);
        let _ = self.latency.remove_label_values(&refs);
        for c in StatusCategory::REPORTED {
            let values = with_extra(&base, c.as_str());
            let _ = self.status.remove_label_values(&as_refs(&values));
        }
        if let Some((_, detail)) = self.details.remove(&id.key()) {
            let values = with_extra(&base, &detail);
            let _ = self.status_detail.remove_label_values(&as_refs(&values));
        }
        debug!(target: "dephealth.metrics", key = %id.key(), "deleted endpoint series");
    }
}

fn as_refs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn with_extra(base: &[String], extra: &str) -> Vec<String> {
    let mut v = base.to_vec();
    v.push(extra.to_string());
    v
}
