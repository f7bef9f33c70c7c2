// SPDX-License-Identifier: MIT OR Apache-2.0
//! Maps a probe failure to a `(category, detail)` pair.
//!
//! Rules, first match wins:
//!
//! 1. a [`CheckError::Classified`] is reported verbatim;
//! 2. known shapes (probe variants, I/O kinds, timer and HTTP client errors)
//!    map to fixed categories;
//! 3. otherwise the cause is classified recursively;
//! 4. the innermost error's message is matched against backend
//!    authentication, DNS and TLS phrases;
//! 5. fallback `error/error`.
//!
//! Messages of wrapping errors are never matched: they routinely embed the
//! request URL, whose host, port and path say nothing about the failure.

use crate::error::{CheckError, GrpcCode};
use dephealth_core::{CheckResult, StatusCategory};
use std::error::Error as StdError;
use std::io;

const MAX_DEPTH: usize = 16;

/// Classify a check outcome. `None` means success.
pub fn classify(outcome: Option<&CheckError>) -> CheckResult {
    match outcome {
        None => CheckResult::ok(),
        Some(err) => classify_error(err),
    }
}

/// Classify any error value, walking its source chain.
pub fn classify_error(err: &(dyn StdError + 'static)) -> CheckResult {
    classify_at(err, 0)
}

fn classify_at(err: &(dyn StdError + 'static), depth: usize) -> CheckResult {
    if let Some(result) = match_shape(err) {
        return result;
    }
    match err.source().filter(|_| depth < MAX_DEPTH) {
        Some(cause) => classify_at(cause, depth + 1),
        None => match_message(&err.to_string()).unwrap_or_else(CheckResult::fallback),
    }
}

fn match_shape(err: &(dyn StdError + 'static)) -> Option<CheckResult> {
    if let Some(check) = err.downcast_ref::<CheckError>() {
        return match_check_error(check);
    }
    if let Some(io) = err.downcast_ref::<io::Error>() {
        return match_io_kind(io.kind());
    }
    if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return Some(CheckResult::of(StatusCategory::Timeout));
    }
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        if http.is_timeout() {
            return Some(CheckResult::of(StatusCategory::Timeout));
        }
        if let Some(status) = http.status() {
            return Some(http_status(status.as_u16()));
        }
    }
    None
}

fn match_check_error(err: &CheckError) -> Option<CheckResult> {
    let result = match err {
        CheckError::Classified {
            category, detail, ..
        } => CheckResult::new(*category, detail.clone()),
        CheckError::Timeout(_) => CheckResult::of(StatusCategory::Timeout),
        CheckError::ConnectionRefused(_) => connection_refused(),
        CheckError::Dns(_) => CheckResult::of(StatusCategory::DnsError),
        CheckError::Tls(_) => CheckResult::of(StatusCategory::TlsError),
        CheckError::Auth(_) => CheckResult::of(StatusCategory::AuthError),
        CheckError::HttpStatus(code) => http_status(*code),
        CheckError::Unhealthy(_) => CheckResult::of(StatusCategory::Unhealthy),
        CheckError::LdapResult { code, .. } => match code {
            49 | 50 => CheckResult::of(StatusCategory::AuthError),
            51..=53 => CheckResult::of(StatusCategory::Unhealthy),
            _ => return None,
        },
        CheckError::Grpc { code, .. } => match code {
            GrpcCode::Unauthenticated | GrpcCode::PermissionDenied => {
                CheckResult::of(StatusCategory::AuthError)
            }
            GrpcCode::DeadlineExceeded => CheckResult::of(StatusCategory::Timeout),
            GrpcCode::Unavailable => connection_refused(),
            GrpcCode::NotServing => CheckResult::new(StatusCategory::Unhealthy, "grpc_not_serving"),
            GrpcCode::ServiceUnknown => CheckResult::new(StatusCategory::Unhealthy, "grpc_unknown"),
            GrpcCode::Other => return None,
        },
        CheckError::Io(io) => return match_io_kind(io.kind()),
        CheckError::Other { .. } => return None,
    };
    Some(result)
}

fn connection_refused() -> CheckResult {
    CheckResult::new(StatusCategory::ConnectionError, "connection_refused")
}

fn http_status(code: u16) -> CheckResult {
    match code {
        401 | 403 => CheckResult::of(StatusCategory::AuthError),
        _ => CheckResult::new(StatusCategory::Unhealthy, format!("http_{code}")),
    }
}

fn match_io_kind(kind: io::ErrorKind) -> Option<CheckResult> {
    match kind {
        io::ErrorKind::TimedOut => Some(CheckResult::of(StatusCategory::Timeout)),
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => Some(connection_refused()),
        _ => None,
    }
}

const AUTH_MARKERS: [&str; 7] = [
    "password authentication failed",
    "noauth",
    "wrongpass",
    "access_refused",
    "access denied for user",
    "error 1045",
    "invalid credentials",
];

const DNS_MARKERS: [&str; 6] = [
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "no such host",
    "temporary failure in name resolution",
];

const TLS_MARKERS: [&str; 3] = ["tls:", "x509:", "certificate"];

fn match_message(message: &str) -> Option<CheckResult> {
    let lower = message.to_ascii_lowercase();
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(CheckResult::of(StatusCategory::AuthError));
    }
    if DNS_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(CheckResult::of(StatusCategory::DnsError));
    }
    if lower.contains("connection refused") || lower.contains("no route to host") {
        return Some(connection_refused());
    }
    if TLS_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(CheckResult::of(StatusCategory::TlsError));
    }
    None
}
