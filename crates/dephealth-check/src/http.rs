// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP GET probe.

use crate::error::CheckError;
use crate::probe::Probe;
use async_trait::async_trait;
use dephealth_core::{DepHealthError, DependencyType, Endpoint};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const TARGET: &str = "dephealth.check";

/// Default path requested by [`HttpProbe`].
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// `User-Agent` sent with every request.
pub const HTTP_USER_AGENT: &str = concat!("dephealth/", env!("CARGO_PKG_VERSION"));

/// Settings for [`HttpProbe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbeConfig {
    /// Path requested on every check.
    pub health_path: String,
    /// Use `https`.
    pub tls: bool,
    /// Accept invalid certificates.
    pub tls_skip_verify: bool,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Sent as `Authorization: Bearer <token>`.
    pub bearer_token: Option<String>,
    /// Sent as HTTP basic auth.
    pub basic_auth: Option<(String, String)>,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            tls: false,
            tls_skip_verify: false,
            headers: BTreeMap::new(),
            bearer_token: None,
            basic_auth: None,
        }
    }
}

/// Healthy on any 2xx answer to `GET <scheme>://<host>:<port><health_path>`.
///
/// 401 and 403 classify as `auth_error`; other statuses as `unhealthy` with
/// detail `http_<status>`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    config: HttpProbeConfig,
}

impl HttpProbe {
    /// Build a probe, validating headers and creating the HTTP client.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::Configuration`] for malformed header names or values,
    /// or when the client cannot be constructed.
    pub fn new(config: HttpProbeConfig) -> Result<Self, DepHealthError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(HTTP_USER_AGENT));
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DepHealthError::config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| DepHealthError::config(format!("invalid header value for {name}: {e}")))?;
            headers.insert(name, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .build()
            .map_err(|e| DepHealthError::config(format!("cannot build HTTP client: {e}")))?;
        debug!(
            target: TARGET,
            health_path = %config.health_path,
            tls = config.tls,
            tls_skip_verify = config.tls_skip_verify,
            headers = config.headers.len(),
            "http probe created"
        );
        Ok(Self { client, config })
    }

    /// The settings this probe was built with.
    pub fn config(&self) -> &HttpProbeConfig {
        &self.config
    }

    /// Request URL for `endpoint`.
    pub fn url_for(&self, endpoint: &Endpoint) -> String {
        let scheme = if self.config.tls { "https" } else { "http" };
        let path = &self.config.health_path;
        let sep = if path.starts_with('/') { "" } else { "/" };
        format!("{scheme}://{}{sep}{path}", endpoint.address())
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, endpoint: &Endpoint, timeout: Duration) -> Result<(), CheckError> {
        let url = self.url_for(endpoint);
        let mut request = self.client.get(&url).timeout(timeout);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some((user, pass)) = &self.config.basic_auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request.send().await.map_err(|e| {
            debug!(target: TARGET, %url, error = %e, "http request failed");
            CheckError::other(e)
        })?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            debug!(target: TARGET, %url, status = status.as_u16(), "http health check rejected");
            Err(CheckError::HttpStatus(status.as_u16()))
        }
    }

    fn dependency_type(&self) -> DependencyType {
        DependencyType::Http
    }
}
