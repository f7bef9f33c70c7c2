// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy shared by every dephealth crate.

use std::fmt;
use thiserror::Error;

/// Stable, machine-readable kind of a [`DepHealthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid declaration: names, ranges, URLs, labels, auth options.
    Configuration,
    /// A dynamic update referenced an endpoint that is not registered.
    EndpointNotFound,
    /// An operation was invoked in the wrong lifecycle phase.
    State,
    /// The metrics backend refused a registration.
    Metrics,
}

impl ErrorKind {
    /// Stable `SCREAMING_SNAKE_CASE` tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::EndpointNotFound => "ENDPOINT_NOT_FOUND",
            Self::State => "STATE",
            Self::Metrics => "METRICS",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced synchronously by the builder and the engine's mutators.
///
/// Probe failures never show up here; they are classified and written to
/// metrics instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepHealthError {
    /// A declaration was rejected.
    #[error("configuration error: {reason}")]
    Configuration {
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// No endpoint is registered under the given key.
    #[error("endpoint not found: {dependency}:{host}:{port}")]
    EndpointNotFound {
        /// Dependency name.
        dependency: String,
        /// Endpoint host.
        host: String,
        /// Endpoint port.
        port: String,
    },

    /// The call is not legal in the current lifecycle phase.
    #[error("invalid state: {reason}")]
    State {
        /// Which transition was refused.
        reason: String,
    },

    /// The metrics backend rejected a collector.
    #[error("metrics registration failed: {reason}")]
    Metrics {
        /// Backend error text.
        reason: String,
    },
}

impl DepHealthError {
    /// Shorthand for [`DepHealthError::Configuration`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`DepHealthError::State`].
    pub fn state(reason: impl Into<String>) -> Self {
        Self::State {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`DepHealthError::EndpointNotFound`].
    pub fn endpoint_not_found(
        dependency: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self::EndpointNotFound {
            dependency: dependency.into(),
            host: host.into(),
            port: port.into(),
        }
    }

    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::EndpointNotFound { .. } => ErrorKind::EndpointNotFound,
            Self::State { .. } => ErrorKind::State,
            Self::Metrics { .. } => ErrorKind::Metrics,
        }
    }

    /// `true` for [`ErrorKind::Configuration`].
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, DepHealthError>;
