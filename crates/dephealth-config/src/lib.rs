// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative configuration for dephealth.
//!
//! This crate provides [`DepHealthConfig`], the serde model of a TOML file
//! declaring an application's dependencies, together with helpers for loading
//! it from disk, validating it, and producing advisory [`ConfigWarning`]s.
//! The [`Environment`] snapshot carries the `DEPHEALTH_*` variables consulted
//! by the builder's overlay step.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod env;

pub use env::{Environment, NAME_VAR, dependency_prefix};

use dephealth_core::config::{
    MAX_INITIAL_DELAY, MAX_INTERVAL, MAX_THRESHOLD, MAX_TIMEOUT, MIN_INTERVAL, MIN_THRESHOLD,
    MIN_TIMEOUT,
};
use dephealth_core::{DepHealthError, DependencyType, validate_label_name, validate_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {}", reasons.join("; "))]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

impl From<ConfigError> for DepHealthError {
    fn from(err: ConfigError) -> Self {
        DepHealthError::config(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A timeout is not below its interval and will be clamped at build time.
    TimeoutClamped {
        /// Dependency name, or `None` for the global default.
        dependency: Option<String>,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
        /// Effective interval in milliseconds.
        interval_ms: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::TimeoutClamped {
                dependency,
                timeout_ms,
                interval_ms,
            } => {
                let scope = dependency.as_deref().unwrap_or("global");
                write!(
                    f,
                    "{scope}: timeout {timeout_ms}ms is not below interval {interval_ms}ms and will be clamped to {}ms",
                    interval_ms.saturating_sub(1)
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level dephealth configuration document.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DepHealthConfig {
    /// Application name; falls back to `DEPHEALTH_NAME` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Application group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Global check interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval_ms: Option<u64>,

    /// Global probe timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Global delay before the first check, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,

    /// Global consecutive-failure threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    /// Global consecutive-success threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,

    /// Declared dependencies keyed by name.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

impl DepHealthConfig {
    /// Global interval as a [`Duration`].
    pub fn check_interval(&self) -> Option<Duration> {
        self.check_interval_ms.map(Duration::from_millis)
    }

    /// Global timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Global initial delay as a [`Duration`].
    pub fn initial_delay(&self) -> Option<Duration> {
        self.initial_delay_ms.map(Duration::from_millis)
    }
}

/// One `[dependencies.<name>]` table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DependencyConfig {
    /// Dependency type (`http`, `postgres`, ...).
    #[serde(rename = "type")]
    pub dep_type: DependencyType,

    /// Connection URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// JDBC connection URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jdbc_url: Option<String>,

    /// `Key=Value;` connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Explicit host (used together with `port`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Explicit port (used together with `host`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// Whether the dependency blocks readiness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,

    /// Per-dependency interval override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    /// Per-dependency timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Per-dependency initial delay override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,

    /// Per-dependency failure threshold override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    /// Per-dependency success threshold override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,

    /// Custom labels applied to every endpoint of the dependency.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// HTTP probe options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpSection>,

    /// gRPC probe options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<GrpcSection>,

    /// PostgreSQL / MySQL probe options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<DbSection>,

    /// Redis probe options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisSection>,

    /// AMQP probe options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amqp: Option<AmqpSection>,

    /// LDAP probe options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap: Option<LdapSection>,
}

impl DependencyConfig {
    /// A table with only the type set.
    pub fn new(dep_type: DependencyType) -> Self {
        Self {
            dep_type,
            url: None,
            jdbc_url: None,
            connection_string: None,
            host: None,
            port: None,
            critical: None,
            interval_ms: None,
            timeout_ms: None,
            initial_delay_ms: None,
            failure_threshold: None,
            success_threshold: None,
            labels: BTreeMap::new(),
            http: None,
            grpc: None,
            db: None,
            redis: None,
            amqp: None,
            ldap: None,
        }
    }

    /// Interval override as a [`Duration`].
    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }

    /// Timeout override as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Initial delay override as a [`Duration`].
    pub fn initial_delay(&self) -> Option<Duration> {
        self.initial_delay_ms.map(Duration::from_millis)
    }

    fn endpoint_sources(&self) -> Vec<&'static str> {
        let mut sources = Vec::new();
        if self.url.is_some() {
            sources.push("url");
        }
        if self.jdbc_url.is_some() {
            sources.push("jdbc_url");
        }
        if self.connection_string.is_some() {
            sources.push("connection_string");
        }
        if self.host.is_some() || self.port.is_some() {
            sources.push("host/port");
        }
        sources
    }
}

/// `[dependencies.<name>.http]`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct HttpSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_skip_verify: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_password: Option<String>,
}

/// `[dependencies.<name>.grpc]`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct GrpcSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_skip_verify: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_password: Option<String>,
}

/// `[dependencies.<name>.db]`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DbSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// `[dependencies.<name>.redis]`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct RedisSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<u32>,
}

/// `[dependencies.<name>.amqp]`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct AmqpSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_host: Option<String>,
}

/// `[dependencies.<name>.ldap]`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct LdapSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_tls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_skip_verify: Option<bool>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`DepHealthConfig`] from a TOML file.
///
/// # Errors
///
/// [`ConfigError::FileNotFound`] when the path cannot be read, and
/// [`ConfigError::ParseError`] when the content is not a valid document.
pub fn load_config(path: &Path) -> Result<DepHealthConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    parse_toml(&content)
}

/// Parse a TOML string into a [`DepHealthConfig`].
pub fn parse_toml(content: &str) -> Result<DepHealthConfig, ConfigError> {
    toml::from_str::<DepHealthConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_duration(
    errors: &mut Vec<String>,
    scope: &str,
    field: &str,
    value: Option<u64>,
    min: Duration,
    max: Duration,
) {
    if let Some(ms) = value {
        let d = Duration::from_millis(ms);
        if d < min || d > max {
            errors.push(format!(
                "{scope}: {field} must be between {}ms and {}ms, got {ms}ms",
                min.as_millis(),
                max.as_millis()
            ));
        }
    }
}

fn check_threshold(errors: &mut Vec<String>, scope: &str, field: &str, value: Option<u32>) {
    if let Some(n) = value
        && !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&n)
    {
        errors.push(format!(
            "{scope}: {field} must be between {MIN_THRESHOLD} and {MAX_THRESHOLD}, got {n}"
        ));
    }
}

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (invalid names, out-of-range durations, missing or ambiguous
/// endpoint sources, bad label names) are returned together as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &DepHealthConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match &config.name {
        Some(name) => {
            if let Err(e) = validate_name("name", name) {
                errors.push(e.to_string());
            }
        }
        None => warnings.push(ConfigWarning::MissingOptionalField {
            field: "name".into(),
            hint: format!("must then be provided through {NAME_VAR}"),
        }),
    }
    match &config.group {
        Some(group) => {
            if let Err(e) = validate_name("group", group) {
                errors.push(e.to_string());
            }
        }
        None => warnings.push(ConfigWarning::MissingOptionalField {
            field: "group".into(),
            hint: "must then be provided to the builder".into(),
        }),
    }

    check_duration(
        &mut errors,
        "global",
        "check_interval_ms",
        config.check_interval_ms,
        MIN_INTERVAL,
        MAX_INTERVAL,
    );
    check_duration(
        &mut errors,
        "global",
        "timeout_ms",
        config.timeout_ms,
        MIN_TIMEOUT,
        MAX_TIMEOUT,
    );
    check_duration(
        &mut errors,
        "global",
        "initial_delay_ms",
        config.initial_delay_ms,
        Duration::ZERO,
        MAX_INITIAL_DELAY,
    );
    check_threshold(&mut errors, "global", "failure_threshold", config.failure_threshold);
    check_threshold(&mut errors, "global", "success_threshold", config.success_threshold);

    let default_interval = config
        .check_interval_ms
        .unwrap_or(dephealth_core::config::DEFAULT_INTERVAL.as_millis() as u64);
    if let Some(timeout) = config.timeout_ms
        && timeout >= default_interval
    {
        warnings.push(ConfigWarning::TimeoutClamped {
            dependency: None,
            timeout_ms: timeout,
            interval_ms: default_interval,
        });
    }

    for (name, dep) in &config.dependencies {
        let scope = format!("dependency '{name}'");
        if let Err(e) = validate_name("dependency name", name) {
            errors.push(e.to_string());
        }

        let sources = dep.endpoint_sources();
        match sources.len() {
            0 => errors.push(format!(
                "{scope}: one of url, jdbc_url, connection_string or host/port is required"
            )),
            1 => {}
            _ => errors.push(format!(
                "{scope}: endpoint sources are mutually exclusive, got {}",
                sources.join(", ")
            )),
        }
        if dep.host.is_some() != dep.port.is_some() {
            errors.push(format!("{scope}: host and port must be set together"));
        }
        if let Some(port) = &dep.port
            && let Err(e) = dephealth_core::validate_port(port)
        {
            errors.push(format!("{scope}: {e}"));
        }

        check_duration(
            &mut errors,
            &scope,
            "interval_ms",
            dep.interval_ms,
            MIN_INTERVAL,
            MAX_INTERVAL,
        );
        check_duration(
            &mut errors,
            &scope,
            "timeout_ms",
            dep.timeout_ms,
            MIN_TIMEOUT,
            MAX_TIMEOUT,
        );
        check_duration(
            &mut errors,
            &scope,
            "initial_delay_ms",
            dep.initial_delay_ms,
            Duration::ZERO,
            MAX_INITIAL_DELAY,
        );
        check_threshold(&mut errors, &scope, "failure_threshold", dep.failure_threshold);
        check_threshold(&mut errors, &scope, "success_threshold", dep.success_threshold);

        let interval = dep.interval_ms.unwrap_or(default_interval);
        if let Some(timeout) = dep.timeout_ms.or(config.timeout_ms)
            && timeout >= interval
            && (dep.timeout_ms.is_some() || dep.interval_ms.is_some())
        {
            warnings.push(ConfigWarning::TimeoutClamped {
                dependency: Some(name.clone()),
                timeout_ms: timeout,
                interval_ms: interval,
            });
        }

        for key in dep.labels.keys() {
            if let Err(e) = validate_label_name(key) {
                errors.push(format!("{scope}: {e}"));
            }
        }

        if dep.critical.is_none() {
            warnings.push(ConfigWarning::MissingOptionalField {
                field: format!("dependencies.{name}.critical"),
                hint: format!(
                    "must then be provided through {}_CRITICAL",
                    dependency_prefix(name)
                ),
            });
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
