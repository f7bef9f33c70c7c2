// SPDX-License-Identifier: MIT OR Apache-2.0
//! Endpoints and the syntactic rules for names, labels, and ports.

use crate::error::{DepHealthError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Label names owned by the metrics exporter. Custom labels may not use them.
pub const RESERVED_LABELS: [&str; 7] = [
    "name",
    "group",
    "dependency",
    "type",
    "host",
    "port",
    "critical",
];

/// Longest accepted dependency / application name.
pub const MAX_NAME_LEN: usize = 63;

/// Validate a dependency, application, or group name against
/// `^[a-z][a-z0-9-]*$` with length 1..=63.
///
/// `what` names the field in the error message.
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(DepHealthError::config(format!(
            "{what} must be 1-{MAX_NAME_LEN} characters, got {:?} ({} chars)",
            name,
            name.len()
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    if !first_ok || !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(DepHealthError::config(format!(
            "{what} must match ^[a-z][a-z0-9-]*$, got {name:?}"
        )));
    }
    Ok(())
}

/// Validate a custom label name: `[A-Za-z_][A-Za-z0-9_]*` and not reserved.
pub fn validate_label_name(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DepHealthError::config(format!(
            "label name must match [A-Za-z_][A-Za-z0-9_]*, got {key:?}"
        )));
    }
    if RESERVED_LABELS.contains(&key) {
        return Err(DepHealthError::config(format!(
            "label name {key:?} is reserved"
        )));
    }
    Ok(())
}

/// Validate every key of a label map.
pub fn validate_labels(labels: &BTreeMap<String, String>) -> Result<()> {
    labels.keys().try_for_each(|k| validate_label_name(k))
}

/// Parse and range-check a decimal port string (1..=65535).
///
/// Only the canonical spelling is accepted: ASCII digits, no sign, no
/// leading zero. The string is used verbatim in registry keys and labels.
pub fn validate_port(port: &str) -> Result<u16> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DepHealthError::config(format!(
            "port must be a number, got {port:?}"
        )));
    }
    if port.len() > 1 && port.starts_with('0') {
        return Err(DepHealthError::config(format!(
            "port must not have leading zeros, got {port:?}"
        )));
    }
    match port.parse::<u32>() {
        Ok(n) if (1..=65535).contains(&n) => Ok(n as u16),
        Ok(n) => Err(DepHealthError::config(format!(
            "port must be between 1 and 65535, got {n}"
        ))),
        Err(_) => Err(DepHealthError::config(format!(
            "port must be a number, got {port:?}"
        ))),
    }
}

/// Registry key for an endpoint: `"<dependency>:<host>:<port>"`.
pub fn endpoint_key(dependency: &str, host: &str, port: &str) -> String {
    format!("{dependency}:{host}:{port}")
}

/// A `(host, port)` target with custom labels.
///
/// Equality and hashing consider only `host` and `port`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

impl Endpoint {
    /// Create an endpoint with no labels. Call [`validate`](Self::validate)
    /// before handing it to the engine.
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Replace the label map.
    #[must_use]
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Add one label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Host name or IP literal (IPv6 without brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Decimal port string.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Custom labels.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Port as a number. Fails the same way [`validate_port`] does.
    pub fn port_number(&self) -> Result<u16> {
        validate_port(&self.port)
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Check host, port, and label names.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DepHealthError::config("endpoint host must not be empty"));
        }
        validate_port(&self.port)?;
        validate_labels(&self.labels)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}
