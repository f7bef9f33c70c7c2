// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-dependency declarations collected by the builder.

use dephealth_config::DependencyConfig;
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything the caller may say about one dependency.
///
/// Every field is optional here; [`DepHealthBuilder::build`] resolves the
/// declaration into [`DependencySettings`], applying environment overlays,
/// URL-derived values, and global defaults, and rejects anything invalid.
///
/// [`DepHealthBuilder::build`]: crate::DepHealthBuilder::build
/// [`DependencySettings`]: crate::DependencySettings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct DependencyOptions {
    pub(crate) url: Option<String>,
    pub(crate) jdbc_url: Option<String>,
    pub(crate) connection_string: Option<String>,
    pub(crate) host: Option<String>,
    pub(crate) port: Option<String>,
    pub(crate) critical: Option<bool>,
    pub(crate) labels: BTreeMap<String, String>,
    pub(crate) interval: Option<Duration>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) initial_delay: Option<Duration>,
    pub(crate) failure_threshold: Option<u32>,
    pub(crate) success_threshold: Option<u32>,

    pub(crate) http_health_path: Option<String>,
    pub(crate) http_tls: Option<bool>,
    pub(crate) http_tls_skip_verify: Option<bool>,
    pub(crate) http_headers: BTreeMap<String, String>,
    pub(crate) http_bearer_token: Option<String>,
    pub(crate) http_basic_auth: Option<(String, String)>,

    pub(crate) grpc_service_name: Option<String>,
    pub(crate) grpc_tls: Option<bool>,
    pub(crate) grpc_tls_skip_verify: Option<bool>,
    pub(crate) grpc_metadata: BTreeMap<String, String>,
    pub(crate) grpc_bearer_token: Option<String>,
    pub(crate) grpc_basic_auth: Option<(String, String)>,

    pub(crate) db_username: Option<String>,
    pub(crate) db_password: Option<String>,
    pub(crate) db_database: Option<String>,
    pub(crate) db_query: Option<String>,

    pub(crate) redis_password: Option<String>,
    pub(crate) redis_db: Option<u32>,

    pub(crate) amqp_username: Option<String>,
    pub(crate) amqp_password: Option<String>,
    pub(crate) amqp_virtual_host: Option<String>,

    pub(crate) ldap_check_method: Option<String>,
    pub(crate) ldap_bind_dn: Option<String>,
    pub(crate) ldap_bind_password: Option<String>,
    pub(crate) ldap_base_dn: Option<String>,
    pub(crate) ldap_search_filter: Option<String>,
    pub(crate) ldap_search_scope: Option<String>,
    pub(crate) ldap_start_tls: Option<bool>,
    pub(crate) ldap_tls_skip_verify: Option<bool>,
}

impl DependencyOptions {
    /// Empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Endpoint sources
    // -----------------------------------------------------------------------

    /// Connection URL (`postgres://…`, `kafka://b1,b2`, …). A `jdbc:` prefix
    /// is accepted and parsed as a JDBC URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// JDBC URL. Credentials are never extracted from it.
    pub fn jdbc_url(mut self, url: impl Into<String>) -> Self {
        self.jdbc_url = Some(url.into());
        self
    }

    /// `Host=h;Port=p` connection string.
    pub fn connection_string(mut self, conn: impl Into<String>) -> Self {
        self.connection_string = Some(conn.into());
        self
    }

    /// Literal host and port. Takes precedence over every other source.
    pub fn host_port(mut self, host: impl Into<String>, port: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self.port = Some(port.into());
        self
    }

    // -----------------------------------------------------------------------
    // Common
    // -----------------------------------------------------------------------

    /// Whether the dependency blocks readiness. Must be set here or through
    /// `DEPHEALTH_<DEP>_CRITICAL`.
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    /// Custom label applied to every endpoint of the dependency.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Interval override.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Timeout override. Clamped below the interval.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Initial delay override.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Failure threshold override.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = Some(n);
        self
    }

    /// Success threshold override.
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = Some(n);
        self
    }

    // -----------------------------------------------------------------------
    // HTTP
    // -----------------------------------------------------------------------

    /// Path requested by the HTTP probe (default `/health`).
    pub fn http_health_path(mut self, path: impl Into<String>) -> Self {
        self.http_health_path = Some(path.into());
        self
    }

    /// Force TLS on or off. Defaults to on for `https://` URLs.
    pub fn http_tls(mut self, tls: bool) -> Self {
        self.http_tls = Some(tls);
        self
    }

    /// Accept invalid certificates.
    pub fn http_tls_skip_verify(mut self, skip: bool) -> Self {
        self.http_tls_skip_verify = Some(skip);
        self
    }

    /// Extra request header.
    pub fn http_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    /// Bearer token.
    pub fn http_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.http_bearer_token = Some(token.into());
        self
    }

    /// Basic authentication.
    pub fn http_basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.http_basic_auth = Some((user.into(), pass.into()));
        self
    }

    // -----------------------------------------------------------------------
    // gRPC
    // -----------------------------------------------------------------------

    /// Service name passed to the gRPC health service (empty = server).
    pub fn grpc_service_name(mut self, name: impl Into<String>) -> Self {
        self.grpc_service_name = Some(name.into());
        self
    }

    /// Use TLS.
    pub fn grpc_tls(mut self, tls: bool) -> Self {
        self.grpc_tls = Some(tls);
        self
    }

    /// Accept invalid certificates.
    pub fn grpc_tls_skip_verify(mut self, skip: bool) -> Self {
        self.grpc_tls_skip_verify = Some(skip);
        self
    }

    /// Request metadata entry.
    pub fn grpc_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.grpc_metadata.insert(key.into(), value.into());
        self
    }

    /// Bearer token.
    pub fn grpc_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.grpc_bearer_token = Some(token.into());
        self
    }

    /// Basic authentication.
    pub fn grpc_basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.grpc_basic_auth = Some((user.into(), pass.into()));
        self
    }

    // -----------------------------------------------------------------------
    // Databases, Redis, AMQP
    // -----------------------------------------------------------------------

    /// Database user; overrides the URL.
    pub fn db_username(mut self, user: impl Into<String>) -> Self {
        self.db_username = Some(user.into());
        self
    }

    /// Database password; overrides the URL.
    pub fn db_password(mut self, pass: impl Into<String>) -> Self {
        self.db_password = Some(pass.into());
        self
    }

    /// Database name; overrides the URL path.
    pub fn db_database(mut self, database: impl Into<String>) -> Self {
        self.db_database = Some(database.into());
        self
    }

    /// Query run by database probes.
    pub fn db_query(mut self, query: impl Into<String>) -> Self {
        self.db_query = Some(query.into());
        self
    }

    /// Redis password; overrides the URL.
    pub fn redis_password(mut self, pass: impl Into<String>) -> Self {
        self.redis_password = Some(pass.into());
        self
    }

    /// Redis database index; overrides the URL path.
    pub fn redis_db(mut self, db: u32) -> Self {
        self.redis_db = Some(db);
        self
    }

    /// AMQP user; overrides the URL.
    pub fn amqp_username(mut self, user: impl Into<String>) -> Self {
        self.amqp_username = Some(user.into());
        self
    }

    /// AMQP password; overrides the URL.
    pub fn amqp_password(mut self, pass: impl Into<String>) -> Self {
        self.amqp_password = Some(pass.into());
        self
    }

    /// AMQP virtual host; overrides the URL path.
    pub fn amqp_virtual_host(mut self, vhost: impl Into<String>) -> Self {
        self.amqp_virtual_host = Some(vhost.into());
        self
    }

    // -----------------------------------------------------------------------
    // LDAP
    // -----------------------------------------------------------------------

    /// One of `anonymous_bind`, `simple_bind`, `root_dse`, `whoami`, `search`.
    pub fn ldap_check_method(mut self, method: impl Into<String>) -> Self {
        self.ldap_check_method = Some(method.into());
        self
    }

    /// Bind DN for `simple_bind`.
    pub fn ldap_bind_dn(mut self, dn: impl Into<String>) -> Self {
        self.ldap_bind_dn = Some(dn.into());
        self
    }

    /// Bind password for `simple_bind`.
    pub fn ldap_bind_password(mut self, pass: impl Into<String>) -> Self {
        self.ldap_bind_password = Some(pass.into());
        self
    }

    /// Base DN for `search`.
    pub fn ldap_base_dn(mut self, dn: impl Into<String>) -> Self {
        self.ldap_base_dn = Some(dn.into());
        self
    }

    /// Filter for `search`.
    pub fn ldap_search_filter(mut self, filter: impl Into<String>) -> Self {
        self.ldap_search_filter = Some(filter.into());
        self
    }

    /// `base`, `one` or `sub`.
    pub fn ldap_search_scope(mut self, scope: impl Into<String>) -> Self {
        self.ldap_search_scope = Some(scope.into());
        self
    }

    /// Upgrade with StartTLS. Incompatible with `ldaps://`.
    pub fn ldap_start_tls(mut self, start_tls: bool) -> Self {
        self.ldap_start_tls = Some(start_tls);
        self
    }

    /// Accept invalid certificates.
    pub fn ldap_tls_skip_verify(mut self, skip: bool) -> Self {
        self.ldap_tls_skip_verify = Some(skip);
        self
    }
}

fn basic(user: &Option<String>, pass: &Option<String>) -> Option<(String, String)> {
    user.as_ref()
        .map(|u| (u.clone(), pass.clone().unwrap_or_default()))
}

impl From<&DependencyConfig> for DependencyOptions {
    fn from(cfg: &DependencyConfig) -> Self {
        let mut opts = DependencyOptions {
            url: cfg.url.clone(),
            jdbc_url: cfg.jdbc_url.clone(),
            connection_string: cfg.connection_string.clone(),
            host: cfg.host.clone(),
            port: cfg.port.clone(),
            critical: cfg.critical,
            labels: cfg.labels.clone(),
            interval: cfg.interval(),
            timeout: cfg.timeout(),
            initial_delay: cfg.initial_delay(),
            failure_threshold: cfg.failure_threshold,
            success_threshold: cfg.success_threshold,
            ..Default::default()
        };
        if let Some(http) = &cfg.http {
            opts.http_health_path = http.health_path.clone();
            opts.http_tls = http.tls;
            opts.http_tls_skip_verify = http.tls_skip_verify;
            opts.http_headers = http.headers.clone();
            opts.http_bearer_token = http.bearer_token.clone();
            opts.http_basic_auth = basic(&http.basic_username, &http.basic_password);
        }
        if let Some(grpc) = &cfg.grpc {
            opts.grpc_service_name = grpc.service_name.clone();
            opts.grpc_tls = grpc.tls;
            opts.grpc_tls_skip_verify = grpc.tls_skip_verify;
            opts.grpc_metadata = grpc.metadata.clone();
            opts.grpc_bearer_token = grpc.bearer_token.clone();
            opts.grpc_basic_auth = basic(&grpc.basic_username, &grpc.basic_password);
        }
        if let Some(db) = &cfg.db {
            opts.db_username = db.username.clone();
            opts.db_password = db.password.clone();
            opts.db_database = db.database.clone();
            opts.db_query = db.query.clone();
        }
        if let Some(redis) = &cfg.redis {
            opts.redis_password = redis.password.clone();
            opts.redis_db = redis.db;
        }
        if let Some(amqp) = &cfg.amqp {
            opts.amqp_username = amqp.username.clone();
            opts.amqp_password = amqp.password.clone();
            opts.amqp_virtual_host = amqp.virtual_host.clone();
        }
        if let Some(ldap) = &cfg.ldap {
            opts.ldap_check_method = ldap.check_method.clone();
            opts.ldap_bind_dn = ldap.bind_dn.clone();
            opts.ldap_bind_password = ldap.bind_password.clone();
            opts.ldap_base_dn = ldap.base_dn.clone();
            opts.ldap_search_filter = ldap.search_filter.clone();
            opts.ldap_search_scope = ldap.search_scope.clone();
            opts.ldap_start_tls = ldap.start_tls;
            opts.ldap_tls_skip_verify = ldap.tls_skip_verify;
        }
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dephealth_config::{HttpSection, RedisSection};
    use dephealth_core::DependencyType;

    #[test]
    fn chained_setters_accumulate() {
        let opts = DependencyOptions::new()
            .url("redis://cache:6379")
            .critical(true)
            .label("role", "primary")
            .label("zone", "a")
            .redis_db(3);
        assert_eq!(opts.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(opts.critical, Some(true));
        assert_eq!(opts.labels.len(), 2);
        assert_eq!(opts.redis_db, Some(3));
    }

    #[test]
    fn from_config_table() {
        let mut cfg = DependencyConfig::new(DependencyType::Http);
        cfg.host = Some("api".into());
        cfg.port = Some("80".into());
        cfg.timeout_ms = Some(1500);
        cfg.http = Some(HttpSection {
            health_path: Some("/ready".into()),
            basic_username: Some("u".into()),
            ..Default::default()
        });
        cfg.redis = Some(RedisSection {
            db: Some(1),
            ..Default::default()
        });
        let opts = DependencyOptions::from(&cfg);
        assert_eq!(opts.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(opts.http_health_path.as_deref(), Some("/ready"));
        assert_eq!(opts.http_basic_auth, Some(("u".into(), String::new())));
        assert_eq!(opts.redis_db, Some(1));
    }
}
