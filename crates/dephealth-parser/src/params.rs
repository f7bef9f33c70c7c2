// SPDX-License-Identifier: MIT OR Apache-2.0
//! Explicit host/port pairs and `Key=Value;` connection strings.

use crate::url::split_host_port;
use dephealth_core::{DepHealthError, Endpoint, Result, validate_port};

const HOST_KEYS: [&str; 6] = [
    "host",
    "server",
    "data source",
    "address",
    "addr",
    "network address",
];

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Build an endpoint from a literal host and port. IPv6 brackets are removed.
///
/// # Errors
///
/// [`DepHealthError::Configuration`] when either part is empty or the port
/// is out of range.
pub fn parse_params(host: &str, port: &str) -> Result<Endpoint> {
    let host = host.trim();
    let port = port.trim();
    if host.is_empty() {
        return Err(DepHealthError::config("empty host"));
    }
    if port.is_empty() {
        return Err(DepHealthError::config("empty port"));
    }
    validate_port(port)?;
    Ok(Endpoint::new(strip_brackets(host), port))
}

/// Parse `Host=h;Port=p` style strings.
///
/// Host keys (case-insensitive): `Host`, `Server`, `Data Source`, `Address`,
/// `Addr`, `Network Address`. `Server=host,port` and `Host=host:port` are
/// also accepted. The returned port is `None` when none was given; callers
/// decide the default.
pub fn parse_connection_string(conn: &str) -> Result<(String, Option<String>)> {
    if conn.trim().is_empty() {
        return Err(DepHealthError::config("empty connection string"));
    }

    let pairs: Vec<(String, &str)> = conn
        .split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim()))
        .collect();
    let lookup = |key: &str| {
        pairs
            .iter()
            .rev()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| *v)
    };

    let mut host = HOST_KEYS
        .iter()
        .find_map(|k| lookup(k))
        .ok_or_else(|| DepHealthError::config("missing host in connection string"))?
        .to_string();
    let mut port = lookup("port").map(str::to_string);

    if port.is_none() {
        if let Some((h, p)) = host.split_once(',') {
            let (h, p) = (h.trim().to_string(), p.trim().to_string());
            host = h;
            port = Some(p);
        } else if host.contains(':') {
            if let Ok((h, p)) = split_host_port(&host, "0") {
                if p != "0" {
                    host = h;
                    port = Some(p);
                }
            }
        }
    }

    let host = strip_brackets(&host).to_string();
    if let Some(p) = &port {
        validate_port(p).map_err(|e| match e {
            DepHealthError::Configuration { reason } => {
                DepHealthError::config(format!("invalid port in connection string: {reason}"))
            }
            other => other,
        })?;
    }
    Ok((host, port))
}
