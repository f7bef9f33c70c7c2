// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resolution of a [`DependencyOptions`] declaration into validated settings.

use crate::options::DependencyOptions;
use dephealth_check::DEFAULT_HEALTH_PATH;
use dephealth_config::{Environment, dependency_prefix};
use dephealth_core::config::{
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_INTERVAL, DEFAULT_SUCCESS_THRESHOLD, DEFAULT_TIMEOUT,
};
use dephealth_core::{
    CheckConfig, DepHealthError, Dependency, DependencyType, Endpoint, Result, validate_labels,
    validate_name,
};
use dephealth_parser::{
    ParsedConnection, UrlParameters, default_port, parse_connection_string, parse_jdbc,
    parse_params, parse_url, strip_jdbc_prefix,
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const TARGET: &str = "dephealth.builder";

// ---------------------------------------------------------------------------
// Global defaults
// ---------------------------------------------------------------------------

/// Builder-wide values applied to dependencies that do not override them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Defaults {
    pub interval: Option<Duration>,
    pub timeout: Option<Duration>,
    pub initial_delay: Option<Duration>,
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
}

impl Defaults {
    /// Config for endpoints added after start: the global interval and
    /// thresholds, no initial delay.
    pub fn dynamic_config(&self) -> Result<CheckConfig> {
        let interval = self.interval.unwrap_or(DEFAULT_INTERVAL);
        CheckConfig::builder()
            .interval(interval)
            .timeout(clamp_timeout(
                self.timeout.unwrap_or(DEFAULT_TIMEOUT),
                interval,
            ))
            .initial_delay(Duration::ZERO)
            .failure_threshold(self.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD))
            .success_threshold(self.success_threshold.unwrap_or(DEFAULT_SUCCESS_THRESHOLD))
            .build()
    }
}

/// Keep `timeout` strictly below `interval`.
pub fn clamp_timeout(timeout: Duration, interval: Duration) -> Duration {
    if timeout >= interval {
        interval.saturating_sub(Duration::from_millis(1))
    } else {
        timeout
    }
}

// ---------------------------------------------------------------------------
// Protocol settings
// ---------------------------------------------------------------------------

/// Resolved HTTP probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Requested path.
    pub health_path: String,
    /// Use `https`.
    pub tls: bool,
    /// Accept invalid certificates.
    pub tls_skip_verify: bool,
    /// Extra headers.
    pub headers: BTreeMap<String, String>,
    /// Bearer token.
    pub bearer_token: Option<String>,
    /// Basic credentials.
    pub basic_auth: Option<(String, String)>,
}

/// Resolved gRPC probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcSettings {
    /// Health service name; empty checks the whole server.
    pub service_name: String,
    /// Use TLS.
    pub tls: bool,
    /// Accept invalid certificates.
    pub tls_skip_verify: bool,
    /// Request metadata.
    pub metadata: BTreeMap<String, String>,
    /// Bearer token.
    pub bearer_token: Option<String>,
    /// Basic credentials.
    pub basic_auth: Option<(String, String)>,
}

/// Resolved PostgreSQL / MySQL settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbSettings {
    /// User.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Database name.
    pub database: Option<String>,
    /// Probe query.
    pub query: Option<String>,
}

/// Resolved Redis settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedisSettings {
    /// Password.
    pub password: Option<String>,
    /// Logical database index.
    pub db: Option<u32>,
}

/// Resolved AMQP settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmqpSettings {
    /// User.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Virtual host.
    pub virtual_host: Option<String>,
}

/// How an LDAP probe asserts liveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LdapCheckMethod {
    /// Anonymous bind.
    AnonymousBind,
    /// Bind with DN and password.
    SimpleBind,
    /// Read the root DSE.
    #[default]
    RootDse,
    /// WhoAmI extended operation.
    WhoAmI,
    /// Search under a base DN.
    Search,
}

impl LdapCheckMethod {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnonymousBind => "anonymous_bind",
            Self::SimpleBind => "simple_bind",
            Self::RootDse => "root_dse",
            Self::WhoAmI => "whoami",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for LdapCheckMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LdapCheckMethod {
    type Err = DepHealthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "anonymous_bind" => Ok(Self::AnonymousBind),
            "simple_bind" => Ok(Self::SimpleBind),
            "root_dse" => Ok(Self::RootDse),
            "whoami" => Ok(Self::WhoAmI),
            "search" => Ok(Self::Search),
            other => Err(DepHealthError::config(format!(
                "invalid LDAP check method {other:?}: must be one of anonymous_bind, simple_bind, root_dse, whoami, search"
            ))),
        }
    }
}

/// LDAP search scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LdapSearchScope {
    /// The base object only.
    Base,
    /// One level below the base.
    One,
    /// The whole subtree.
    #[default]
    Sub,
}

impl FromStr for LdapSearchScope {
    type Err = DepHealthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base" => Ok(Self::Base),
            "one" => Ok(Self::One),
            "sub" => Ok(Self::Sub),
            other => Err(DepHealthError::config(format!(
                "invalid LDAP search scope {other:?}: must be one of base, one, sub"
            ))),
        }
    }
}

/// Resolved LDAP settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapSettings {
    /// Check method.
    pub check_method: LdapCheckMethod,
    /// Bind DN.
    pub bind_dn: Option<String>,
    /// Bind password.
    pub bind_password: Option<String>,
    /// Search base.
    pub base_dn: Option<String>,
    /// Search filter.
    pub search_filter: Option<String>,
    /// Search scope.
    pub search_scope: LdapSearchScope,
    /// Upgrade with StartTLS.
    pub start_tls: bool,
    /// `ldaps://`.
    pub tls: bool,
    /// Accept invalid certificates.
    pub tls_skip_verify: bool,
}

/// Type-specific settings handed to probe factories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolSettings {
    /// `http`
    Http(HttpSettings),
    /// `grpc`
    Grpc(GrpcSettings),
    /// `postgres` and `mysql`
    Database(DbSettings),
    /// `redis`
    Redis(RedisSettings),
    /// `amqp`
    Amqp(AmqpSettings),
    /// `ldap`
    Ldap(LdapSettings),
    /// `tcp` and `kafka` carry no extra settings.
    None,
}

// ---------------------------------------------------------------------------
// DependencySettings
// ---------------------------------------------------------------------------

/// The fully resolved form of one declared dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencySettings {
    dependency: Dependency,
    labels: BTreeMap<String, String>,
    protocol: ProtocolSettings,
}

impl DependencySettings {
    /// The validated dependency registered with the scheduler.
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    /// Dependency name.
    pub fn name(&self) -> &str {
        self.dependency.name()
    }

    /// Dependency type.
    pub fn dep_type(&self) -> DependencyType {
        self.dependency.dep_type()
    }

    /// Resolved criticality.
    pub fn critical(&self) -> bool {
        self.dependency.critical()
    }

    /// Resolved endpoints, each carrying [`labels`](Self::labels).
    pub fn endpoints(&self) -> &[Endpoint] {
        self.dependency.endpoints()
    }

    /// Resolved check config.
    pub fn config(&self) -> &CheckConfig {
        self.dependency.config()
    }

    /// Custom labels after the environment overlay.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Type-specific settings.
    pub fn protocol(&self) -> &ProtocolSettings {
        &self.protocol
    }

    /// HTTP settings, for `http` dependencies.
    pub fn http(&self) -> Option<&HttpSettings> {
        match &self.protocol {
            ProtocolSettings::Http(s) => Some(s),
            _ => None,
        }
    }

    /// gRPC settings, for `grpc` dependencies.
    pub fn grpc(&self) -> Option<&GrpcSettings> {
        match &self.protocol {
            ProtocolSettings::Grpc(s) => Some(s),
            _ => None,
        }
    }

    /// Database settings, for `postgres` and `mysql` dependencies.
    pub fn db(&self) -> Option<&DbSettings> {
        match &self.protocol {
            ProtocolSettings::Database(s) => Some(s),
            _ => None,
        }
    }

    /// Redis settings, for `redis` dependencies.
    pub fn redis(&self) -> Option<&RedisSettings> {
        match &self.protocol {
            ProtocolSettings::Redis(s) => Some(s),
            _ => None,
        }
    }

    /// AMQP settings, for `amqp` dependencies.
    pub fn amqp(&self) -> Option<&AmqpSettings> {
        match &self.protocol {
            ProtocolSettings::Amqp(s) => Some(s),
            _ => None,
        }
    }

    /// LDAP settings, for `ldap` dependencies.
    pub fn ldap(&self) -> Option<&LdapSettings> {
        match &self.protocol {
            ProtocolSettings::Ldap(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn prefixed(name: &str, err: DepHealthError) -> DepHealthError {
    match err {
        DepHealthError::Configuration { reason } => {
            DepHealthError::config(format!("dependency {name:?}: {reason}"))
        }
        other => other,
    }
}

fn url_scheme(url: &str) -> Option<String> {
    url.split_once("://").map(|(s, _)| s.to_ascii_lowercase())
}

fn from_parsed(
    name: &str,
    dep_type: DependencyType,
    parsed: Vec<ParsedConnection>,
) -> Vec<Endpoint> {
    parsed
        .into_iter()
        .map(|pc| {
            if pc.dep_type != dep_type {
                warn!(
                    target: TARGET,
                    dependency = name,
                    declared = %dep_type,
                    url_type = %pc.dep_type,
                    "URL scheme does not match the declared dependency type"
                );
            }
            pc.to_endpoint()
        })
        .collect()
}

/// Endpoints from the first source present, in priority order
/// host+port, JDBC URL, connection string, URL.
fn resolve_endpoints(
    name: &str,
    dep_type: DependencyType,
    opts: &DependencyOptions,
) -> Result<Vec<Endpoint>> {
    match (&opts.host, &opts.port) {
        (Some(host), Some(port)) => return Ok(vec![parse_params(host, port)?]),
        (Some(_), None) | (None, Some(_)) => {
            return Err(DepHealthError::config("host and port must be set together"));
        }
        (None, None) => {}
    }
    if let Some(jdbc) = &opts.jdbc_url {
        return Ok(from_parsed(name, dep_type, parse_jdbc(jdbc)?));
    }
    if let Some(conn) = &opts.connection_string {
        let (host, port) = parse_connection_string(conn)?;
        let port = match port {
            Some(p) => p,
            None => default_port(dep_type.as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    DepHealthError::config(format!(
                        "connection string has no port and {dep_type} has no default"
                    ))
                })?,
        };
        return Ok(vec![parse_params(&host, &port)?]);
    }
    if let Some(url) = &opts.url {
        let parsed = if strip_jdbc_prefix(url).is_some() {
            parse_jdbc(url)?
        } else {
            parse_url(url)?
        };
        return Ok(from_parsed(name, dep_type, parsed));
    }
    Err(DepHealthError::config(
        "one of url, jdbc_url, connection_string or host+port is required",
    ))
}

fn validate_auth(
    what: &str,
    bearer: &Option<String>,
    basic: &Option<(String, String)>,
    extra: &BTreeMap<String, String>,
) -> Result<()> {
    let methods = usize::from(bearer.is_some())
        + usize::from(basic.is_some())
        + usize::from(extra.keys().any(|k| k.eq_ignore_ascii_case("authorization")));
    if methods > 1 {
        return Err(DepHealthError::config(format!(
            "conflicting {what} auth methods: specify only one of bearer token, basic auth, or authorization {}",
            if what == "HTTP" { "header" } else { "metadata" }
        )));
    }
    Ok(())
}

fn resolve_ldap(opts: &DependencyOptions) -> Result<LdapSettings> {
    let check_method = match &opts.ldap_check_method {
        Some(m) => m.parse()?,
        None => LdapCheckMethod::default(),
    };
    let search_scope = match &opts.ldap_search_scope {
        Some(s) => s.parse()?,
        None => LdapSearchScope::default(),
    };
    let blank = |v: &Option<String>| v.as_deref().is_none_or(str::is_empty);
    if check_method == LdapCheckMethod::SimpleBind
        && (blank(&opts.ldap_bind_dn) || blank(&opts.ldap_bind_password))
    {
        return Err(DepHealthError::config(
            "simple_bind requires both bind DN and bind password",
        ));
    }
    if check_method == LdapCheckMethod::Search && blank(&opts.ldap_base_dn) {
        return Err(DepHealthError::config("search method requires a base DN"));
    }
    let tls = opts
        .url
        .as_deref()
        .and_then(url_scheme)
        .is_some_and(|s| s == "ldaps");
    let start_tls = opts.ldap_start_tls.unwrap_or(false);
    if start_tls && tls {
        return Err(DepHealthError::config(
            "StartTLS is incompatible with the ldaps:// scheme",
        ));
    }
    Ok(LdapSettings {
        check_method,
        bind_dn: opts.ldap_bind_dn.clone(),
        bind_password: opts.ldap_bind_password.clone(),
        base_dn: opts.ldap_base_dn.clone(),
        search_filter: opts.ldap_search_filter.clone(),
        search_scope,
        start_tls,
        tls,
        tls_skip_verify: opts.ldap_tls_skip_verify.unwrap_or(false),
    })
}

fn resolve_protocol(dep_type: DependencyType, opts: &DependencyOptions) -> Result<ProtocolSettings> {
    // JDBC URLs are left to the driver.
    let from_url = opts
        .url
        .as_deref()
        .map(|u| UrlParameters::from_url(u, dep_type))
        .unwrap_or_default();
    let scheme = opts.url.as_deref().and_then(url_scheme);

    let settings = match dep_type {
        DependencyType::Http => {
            validate_auth(
                "HTTP",
                &opts.http_bearer_token,
                &opts.http_basic_auth,
                &opts.http_headers,
            )?;
            ProtocolSettings::Http(HttpSettings {
                health_path: opts
                    .http_health_path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
                tls: opts
                    .http_tls
                    .unwrap_or_else(|| scheme.as_deref() == Some("https")),
                tls_skip_verify: opts.http_tls_skip_verify.unwrap_or(false),
                headers: opts.http_headers.clone(),
                bearer_token: opts.http_bearer_token.clone(),
                basic_auth: opts.http_basic_auth.clone(),
            })
        }
        DependencyType::Grpc => {
            validate_auth(
                "gRPC",
                &opts.grpc_bearer_token,
                &opts.grpc_basic_auth,
                &opts.grpc_metadata,
            )?;
            ProtocolSettings::Grpc(GrpcSettings {
                service_name: opts.grpc_service_name.clone().unwrap_or_default(),
                tls: opts.grpc_tls.unwrap_or(false),
                tls_skip_verify: opts.grpc_tls_skip_verify.unwrap_or(false),
                metadata: opts.grpc_metadata.clone(),
                bearer_token: opts.grpc_bearer_token.clone(),
                basic_auth: opts.grpc_basic_auth.clone(),
            })
        }
        DependencyType::Postgres | DependencyType::Mysql => ProtocolSettings::Database(DbSettings {
            username: opts.db_username.clone().or(from_url.db_username),
            password: opts.db_password.clone().or(from_url.db_password),
            database: opts.db_database.clone().or(from_url.db_database),
            query: opts.db_query.clone(),
        }),
        DependencyType::Redis => ProtocolSettings::Redis(RedisSettings {
            password: opts.redis_password.clone().or(from_url.redis_password),
            db: opts.redis_db.or(from_url.redis_db),
        }),
        DependencyType::Amqp => ProtocolSettings::Amqp(AmqpSettings {
            username: opts.amqp_username.clone().or(from_url.amqp_username),
            password: opts.amqp_password.clone().or(from_url.amqp_password),
            virtual_host: opts.amqp_virtual_host.clone().or(from_url.amqp_virtual_host),
        }),
        DependencyType::Ldap => ProtocolSettings::Ldap(resolve_ldap(opts)?),
        DependencyType::Tcp | DependencyType::Kafka => ProtocolSettings::None,
    };
    Ok(settings)
}

fn resolve_config(opts: &DependencyOptions, defaults: &Defaults) -> Result<CheckConfig> {
    let interval = opts
        .interval
        .or(defaults.interval)
        .unwrap_or(DEFAULT_INTERVAL);
    let requested = opts.timeout.or(defaults.timeout).unwrap_or(DEFAULT_TIMEOUT);
    let timeout = clamp_timeout(requested, interval);
    if timeout != requested {
        debug!(
            target: TARGET,
            requested_ms = requested.as_millis() as u64,
            clamped_ms = timeout.as_millis() as u64,
            "timeout clamped below interval"
        );
    }
    CheckConfig::builder()
        .interval(interval)
        .timeout(timeout)
        .initial_delay(
            opts.initial_delay
                .or(defaults.initial_delay)
                .unwrap_or(Duration::ZERO),
        )
        .failure_threshold(
            opts.failure_threshold
                .or(defaults.failure_threshold)
                .unwrap_or(DEFAULT_FAILURE_THRESHOLD),
        )
        .success_threshold(
            opts.success_threshold
                .or(defaults.success_threshold)
                .unwrap_or(DEFAULT_SUCCESS_THRESHOLD),
        )
        .build()
}

/// Resolve one declaration: environment overlay, endpoints, URL-derived
/// credentials, check config with the timeout clamp, and protocol settings.
///
/// # Errors
///
/// [`DepHealthError::Configuration`], prefixed with the dependency name.
pub(crate) fn resolve(
    name: &str,
    dep_type: DependencyType,
    opts: &DependencyOptions,
    env: &Environment,
    defaults: &Defaults,
) -> Result<DependencySettings> {
    validate_name("dependency name", name)?;
    resolve_inner(name, dep_type, opts, env, defaults).map_err(|e| prefixed(name, e))
}

fn resolve_inner(
    name: &str,
    dep_type: DependencyType,
    opts: &DependencyOptions,
    env: &Environment,
    defaults: &Defaults,
) -> Result<DependencySettings> {
    let critical = opts.critical.or_else(|| env.critical_for(name));
    let mut labels = opts.labels.clone();
    for (key, value) in env.labels_for(name) {
        labels.entry(key).or_insert(value);
    }
    validate_labels(&labels)?;

    let endpoints: Vec<Endpoint> = resolve_endpoints(name, dep_type, opts)?
        .into_iter()
        .map(|ep| ep.with_labels(labels.clone()))
        .collect();
    let config = resolve_config(opts, defaults)?;
    let protocol = resolve_protocol(dep_type, opts)?;

    let critical = critical.ok_or_else(|| {
        DepHealthError::config(format!(
            "critical must be set explicitly or through {}_CRITICAL",
            dependency_prefix(name)
        ))
    })?;
    let dependency = Dependency::builder(name, dep_type)
        .critical(critical)
        .endpoints(endpoints)
        .config(config)
        .build()?;

    Ok(DependencySettings {
        dependency,
        labels,
        protocol,
    })
}
