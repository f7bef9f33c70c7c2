// SPDX-License-Identifier: MIT OR Apache-2.0
//! Credentials and per-type parameters embedded in connection URLs.

use crate::url::{split_url, strip_jdbc_prefix};
use dephealth_core::DependencyType;
use percent_encoding::percent_decode_str;

/// Values discovered inside a URL's userinfo and path.
///
/// Every field is `None` when the URL does not carry it. Builder options set
/// explicitly take precedence over these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParameters {
    /// PostgreSQL / MySQL user.
    pub db_username: Option<String>,
    /// PostgreSQL / MySQL password.
    pub db_password: Option<String>,
    /// PostgreSQL / MySQL database name.
    pub db_database: Option<String>,
    /// Redis password (the user part is discarded).
    pub redis_password: Option<String>,
    /// Redis logical database index.
    pub redis_db: Option<u32>,
    /// AMQP user.
    pub amqp_username: Option<String>,
    /// AMQP password.
    pub amqp_password: Option<String>,
    /// AMQP virtual host.
    pub amqp_virtual_host: Option<String>,
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

impl UrlParameters {
    /// Extract parameters for `dep_type` from `raw`.
    ///
    /// JDBC URLs and URLs that fail to split yield the empty set: the driver
    /// owns JDBC credentials, and malformed URLs are reported by the endpoint
    /// parser instead.
    pub fn from_url(raw: &str, dep_type: DependencyType) -> Self {
        if strip_jdbc_prefix(raw).is_some() {
            return Self::default();
        }
        let Ok(parts) = split_url(raw) else {
            return Self::default();
        };

        let (user, pass) = match parts.userinfo {
            Some(info) => match info.split_once(':') {
                Some((u, p)) => (non_empty(decode(u)), Some(decode(p))),
                None => (non_empty(decode(info)), None),
            },
            None => (None, None),
        };
        let path = parts.path.strip_prefix('/');

        let mut params = Self::default();
        match dep_type {
            DependencyType::Postgres | DependencyType::Mysql => {
                params.db_username = user;
                params.db_password = pass;
                params.db_database = path.map(decode).and_then(non_empty);
            }
            DependencyType::Amqp => {
                params.amqp_username = user;
                params.amqp_password = pass;
                params.amqp_virtual_host = match path {
                    Some("") => Some("/".to_string()),
                    Some(p) => non_empty(decode(p)),
                    None => None,
                };
            }
            DependencyType::Redis => {
                params.redis_password = pass.filter(|p| !p.is_empty());
                params.redis_db = path.and_then(|p| p.parse::<u32>().ok());
            }
            _ => {}
        }
        params
    }
}
