// SPDX-License-Identifier: MIT OR Apache-2.0
//! Check outcome categories and the read-only endpoint status snapshot.

use crate::endpoint::{Endpoint, endpoint_key};
use crate::types::DependencyType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// StatusCategory
// ---------------------------------------------------------------------------

/// Classification of a check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    /// Check succeeded.
    Ok,
    /// Deadline exceeded.
    Timeout,
    /// Connection refused or host unreachable.
    ConnectionError,
    /// Host name did not resolve.
    DnsError,
    /// Credentials rejected.
    AuthError,
    /// TLS handshake failed.
    TlsError,
    /// Reachable but reports itself unhealthy.
    Unhealthy,
    /// Anything else.
    Error,
    /// No check has completed yet. Never emitted as a metric label.
    Unknown,
}

impl StatusCategory {
    /// The eight categories that appear in the `status` metric label.
    pub const REPORTED: [StatusCategory; 8] = [
        Self::Ok,
        Self::Timeout,
        Self::ConnectionError,
        Self::DnsError,
        Self::AuthError,
        Self::TlsError,
        Self::Unhealthy,
        Self::Error,
    ];

    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::DnsError => "dns_error",
            Self::AuthError => "auth_error",
            Self::TlsError => "tls_error",
            Self::Unhealthy => "unhealthy",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CheckResult
// ---------------------------------------------------------------------------

/// `(category, detail)` pair produced by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckResult {
    /// Outcome category.
    pub category: StatusCategory,
    /// Lowercase detail token; usually the category name.
    pub detail: String,
}

impl CheckResult {
    /// Pair a category with an explicit detail.
    pub fn new(category: StatusCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
        }
    }

    /// Category with detail equal to its own label.
    pub fn of(category: StatusCategory) -> Self {
        Self::new(category, category.as_str())
    }

    /// `ok/ok`.
    pub fn ok() -> Self {
        Self::of(StatusCategory::Ok)
    }

    /// `error/error`, the classifier fallback.
    pub fn fallback() -> Self {
        Self::of(StatusCategory::Error)
    }

    /// `true` for the `error/error` fallback.
    pub fn is_fallback(&self) -> bool {
        self.category == StatusCategory::Error && self.detail == "error"
    }
}

// ---------------------------------------------------------------------------
// EndpointIdentity
// ---------------------------------------------------------------------------

/// Static identifying fields of a registered endpoint.
///
/// Captured once at registration so metric series can be rebuilt or deleted
/// without consulting the owning dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointIdentity {
    /// Dependency name.
    pub dependency: String,
    /// Dependency type.
    pub dep_type: DependencyType,
    /// Criticality flag.
    pub critical: bool,
    /// The endpoint, including its labels.
    pub endpoint: Endpoint,
}

impl EndpointIdentity {
    /// Bundle the fields.
    pub fn new(
        dependency: impl Into<String>,
        dep_type: DependencyType,
        critical: bool,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            dependency: dependency.into(),
            dep_type,
            critical,
            endpoint,
        }
    }

    /// Registry key `"<dependency>:<host>:<port>"`.
    pub fn key(&self) -> String {
        endpoint_key(&self.dependency, self.endpoint.host(), self.endpoint.port())
    }

    /// `"yes"` or `"no"`, as emitted in the `critical` label.
    pub fn critical_label(&self) -> &'static str {
        if self.critical { "yes" } else { "no" }
    }
}

// ---------------------------------------------------------------------------
// EndpointStatus
// ---------------------------------------------------------------------------

/// Immutable snapshot of one endpoint's last observed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStatus {
    /// `None` until the first check completes.
    pub healthy: Option<bool>,
    /// Last category, or [`StatusCategory::Unknown`].
    pub status: StatusCategory,
    /// Last detail, or `"unknown"`.
    pub detail: String,
    /// Duration of the last check; zero while unknown.
    #[serde(rename = "latency_ms", with = "latency_millis")]
    pub latency: Duration,
    /// Dependency type.
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    /// Dependency name.
    pub name: String,
    /// Endpoint host.
    pub host: String,
    /// Endpoint port.
    pub port: String,
    /// Criticality flag.
    pub critical: bool,
    /// Completion time of the last check.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Custom labels, including keys that are not emitted as metric labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl EndpointStatus {
    /// Snapshot for an endpoint that has not been checked yet.
    pub fn unknown(identity: &EndpointIdentity) -> Self {
        Self {
            healthy: None,
            status: StatusCategory::Unknown,
            detail: StatusCategory::Unknown.as_str().to_string(),
            latency: Duration::ZERO,
            dep_type: identity.dep_type,
            name: identity.dependency.clone(),
            host: identity.endpoint.host().to_string(),
            port: identity.endpoint.port().to_string(),
            critical: identity.critical,
            last_checked_at: None,
            labels: identity.endpoint.labels().clone(),
        }
    }

    /// Latency in fractional milliseconds.
    pub fn latency_millis(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

mod latency_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        Ok(Duration::try_from_secs_f64(ms / 1000.0).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> EndpointIdentity {
        EndpointIdentity::new(
            "db",
            DependencyType::Postgres,
            true,
            Endpoint::new("pg", "5432").with_label("zone", "a"),
        )
    }

    #[test]
    fn reported_excludes_unknown() {
        assert_eq!(StatusCategory::REPORTED.len(), 8);
        assert!(!StatusCategory::REPORTED.contains(&StatusCategory::Unknown));
    }

    #[test]
    fn check_result_shorthands() {
        assert_eq!(CheckResult::ok().detail, "ok");
        assert!(CheckResult::fallback().is_fallback());
        assert!(!CheckResult::new(StatusCategory::Error, "panic").is_fallback());
        assert_eq!(CheckResult::of(StatusCategory::DnsError).detail, "dns_error");
    }

    #[test]
    fn identity_key_and_critical_label() {
        let id = identity();
        assert_eq!(id.key(), "db:pg:5432");
        assert_eq!(id.critical_label(), "yes");
    }

    #[test]
    fn unknown_snapshot() {
        let s = EndpointStatus::unknown(&identity());
        assert_eq!(s.healthy, None);
        assert_eq!(s.status, StatusCategory::Unknown);
        assert_eq!(s.detail, "unknown");
        assert_eq!(s.latency, Duration::ZERO);
        assert!(s.last_checked_at.is_none());
        assert_eq!(s.labels["zone"], "a");
    }

    #[test]
    fn json_shape() {
        let mut s = EndpointStatus::unknown(&identity());
        s.latency = Duration::from_micros(2500);
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["healthy"], serde_json::Value::Null);
        assert_eq!(v["status"], "unknown");
        assert_eq!(v["type"], "postgres");
        assert_eq!(v["latency_ms"], 2.5);
        assert_eq!(v["last_checked_at"], serde_json::Value::Null);
    }
}
