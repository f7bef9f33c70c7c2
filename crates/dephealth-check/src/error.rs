// SPDX-License-Identifier: MIT OR Apache-2.0
//! Failure type returned by probes.

use dephealth_core::StatusCategory;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used as an opaque cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// gRPC outcome codes that carry a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrpcCode {
    /// RPC status `UNAUTHENTICATED`.
    Unauthenticated,
    /// RPC status `PERMISSION_DENIED`.
    PermissionDenied,
    /// RPC status `DEADLINE_EXCEEDED`.
    DeadlineExceeded,
    /// RPC status `UNAVAILABLE`.
    Unavailable,
    /// Health service answered `NOT_SERVING`.
    NotServing,
    /// Health service answered `SERVICE_UNKNOWN` / `UNKNOWN`.
    ServiceUnknown,
    /// Any other RPC status.
    Other,
}

impl GrpcCode {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Unavailable => "UNAVAILABLE",
            Self::NotServing => "NOT_SERVING",
            Self::ServiceUnknown => "SERVICE_UNKNOWN",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for GrpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a probe considers an endpoint unhealthy.
///
/// [`CheckError::Classified`] carries the probe's own `(category, detail)`
/// and is reported verbatim. Every other variant is a shape the classifier
/// knows how to map; [`CheckError::Other`] defers to its source chain.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Probe-chosen classification.
    #[error("{message}")]
    Classified {
        /// Status category.
        category: StatusCategory,
        /// Detail token.
        detail: String,
        /// Human-readable message.
        message: String,
        /// Optional underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// The deadline elapsed.
    #[error("check timed out after {0:?}")]
    Timeout(Duration),

    /// The target refused the connection or was unreachable.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The host name did not resolve.
    #[error("dns lookup failed: {0}")]
    Dns(String),

    /// TLS negotiation failed.
    #[error("tls handshake failed: {0}")]
    Tls(String),

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// An HTTP endpoint answered with a non-2xx status.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The dependency answered but reports itself unhealthy.
    #[error("dependency unhealthy: {0}")]
    Unhealthy(String),

    /// An LDAP operation returned a non-success result code.
    #[error("ldap result code {code}: {message}")]
    LdapResult {
        /// LDAP result code.
        code: u32,
        /// Diagnostic message.
        message: String,
    },

    /// A gRPC call or health query failed.
    #[error("grpc {code}: {message}")]
    Grpc {
        /// Status code.
        code: GrpcCode,
        /// Diagnostic message.
        message: String,
    },

    /// Raw I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Anything else; classified through its source chain.
    #[error("{message}")]
    Other {
        /// Human-readable message.
        message: String,
        /// Optional underlying cause.
        #[source]
        source: Option<BoxError>,
    },
}

impl CheckError {
    /// Failure with an explicit classification.
    pub fn classified(
        category: StatusCategory,
        detail: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Classified {
            category,
            detail: detail.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary error for chain classification.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Failure described only by a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            source: None,
        }
    }

    /// Attach a cause to a [`CheckError::Classified`] or [`CheckError::Other`].
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_source<E>(self, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Self::Classified {
                category,
                detail,
                message,
                ..
            } => Self::Classified {
                category,
                detail,
                message,
                source: Some(Box::new(err)),
            },
            Self::Other { message, .. } => Self::Other {
                message,
                source: Some(Box::new(err)),
            },
            other => other,
        }
    }
}
