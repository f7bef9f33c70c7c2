// SPDX-License-Identifier: MIT OR Apache-2.0
//! The probe contract.

use crate::error::CheckError;
use async_trait::async_trait;
use dephealth_core::{DependencyType, Endpoint};
use std::time::Duration;

/// A protocol-specific liveness check.
///
/// Implementations should be stateless with respect to endpoints and safe to
/// call concurrently for distinct endpoints. The scheduler never runs two
/// checks for the same endpoint at once.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Check `endpoint`, giving up after `timeout`.
    ///
    /// Return [`CheckError::Classified`] to choose the reported category
    /// directly; any other variant is mapped by the classifier.
    async fn check(&self, endpoint: &Endpoint, timeout: Duration) -> Result<(), CheckError>;

    /// The dependency type this probe serves.
    fn dependency_type(&self) -> DependencyType;
}
