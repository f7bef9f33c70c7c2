// SPDX-License-Identifier: MIT OR Apache-2.0
//! The running engine returned by [`DepHealthBuilder::build`].

use crate::builder::DepHealthBuilder;
use crate::settings::DependencySettings;
use dephealth_check::Probe;
use dephealth_core::{DependencyType, Endpoint, EndpointStatus, Result};
use dephealth_scheduler::Scheduler;
use prometheus::Registry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Health probing for one application.
///
/// Wraps the scheduler with the identity and resolved settings of every
/// declared dependency. Dropping the engine cancels its check loops; call
/// [`stop`](Self::stop) to let in-flight checks finish first.
#[derive(Debug)]
pub struct DepHealth {
    name: String,
    group: String,
    scheduler: Scheduler,
    settings: BTreeMap<String, DependencySettings>,
}

impl DepHealth {
    /// Start declaring dependencies for application `name` in `group`,
    /// reporting to `registry`.
    ///
    /// An empty `name` is resolved from `DEPHEALTH_NAME` at build time.
    pub fn builder(
        name: impl Into<String>,
        group: impl Into<String>,
        registry: &Registry,
    ) -> DepHealthBuilder {
        DepHealthBuilder::new(name, group, registry)
    }

    pub(crate) fn new(
        name: String,
        group: String,
        scheduler: Scheduler,
        settings: BTreeMap<String, DependencySettings>,
    ) -> Self {
        Self {
            name,
            group,
            scheduler,
            settings,
        }
    }

    /// Begin periodic checks. Must run inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::State`](dephealth_core::DepHealthError::State) when
    /// already started or stopped.
    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    /// Cancel all checks, waiting briefly for in-flight ones. Idempotent.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    /// `"<dependency>:<host>:<port>"` → healthy, for endpoints checked at
    /// least once.
    pub fn health(&self) -> BTreeMap<String, bool> {
        self.scheduler.health()
    }

    /// Status of every registered endpoint, including unchecked ones.
    pub fn health_details(&self) -> BTreeMap<String, EndpointStatus> {
        self.scheduler.health_details()
    }

    /// Add an endpoint at runtime. A no-op if it is already registered.
    ///
    /// # Errors
    ///
    /// Configuration errors for invalid input, state errors unless running.
    pub fn add_endpoint(
        &self,
        dependency: &str,
        dep_type: DependencyType,
        critical: bool,
        endpoint: Endpoint,
        probe: Arc<dyn Probe>,
    ) -> Result<()> {
        self.scheduler
            .add_endpoint(dependency, dep_type, critical, endpoint, probe)
    }

    /// Remove an endpoint and its metric series. A no-op if absent.
    ///
    /// # Errors
    ///
    /// State error before start.
    pub fn remove_endpoint(&self, dependency: &str, host: &str, port: &str) -> Result<()> {
        self.scheduler.remove_endpoint(dependency, host, port)
    }

    /// Move an endpoint to a new address, keeping type and criticality.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::EndpointNotFound`](dephealth_core::DepHealthError::EndpointNotFound)
    /// when the old endpoint is not registered.
    pub fn update_endpoint(
        &self,
        dependency: &str,
        old_host: &str,
        old_port: &str,
        endpoint: Endpoint,
        probe: Arc<dyn Probe>,
    ) -> Result<()> {
        self.scheduler
            .update_endpoint(dependency, old_host, old_port, endpoint, probe)
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Custom label keys emitted on every series, sorted.
    pub fn custom_label_keys(&self) -> &[String] {
        self.scheduler.exporter().custom_labels()
    }

    /// Resolved settings of a declared dependency.
    pub fn settings(&self, dependency: &str) -> Option<&DependencySettings> {
        self.settings.get(dependency)
    }

    /// All declared dependencies, by name.
    pub fn dependencies(&self) -> impl Iterator<Item = &DependencySettings> {
        self.settings.values()
    }

    /// `true` once started.
    pub fn is_started(&self) -> bool {
        self.scheduler.is_started()
    }

    /// `true` once stopped.
    pub fn is_stopped(&self) -> bool {
        self.scheduler.is_stopped()
    }

    /// The underlying scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
