// SPDX-License-Identifier: MIT OR Apache-2.0
//! Periodic check execution and the dynamic endpoint API.

use crate::cancel::{CancelReason, CancellationToken};
use crate::pool::WorkerPool;
use crate::state::{EndpointState, HealthState, ScheduleHandle, Transition, lock};
use chrono::Utc;
use dephealth_check::{CheckError, Probe, classify};
use dephealth_core::{
    CheckConfig, CheckResult, DepHealthError, Dependency, DependencyType, Endpoint,
    EndpointIdentity, EndpointStatus, Result, StatusCategory, endpoint_key, validate_name,
};
use dephealth_metrics::MetricsExporter;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// How long [`Scheduler::stop`] waits for in-flight checks.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

const TARGET: &str = "dephealth.scheduler";

type Registry = BTreeMap<String, Arc<EndpointState>>;

/// Everything a check loop needs.
#[derive(Clone)]
struct Job {
    state: Arc<EndpointState>,
    probe: Arc<dyn Probe>,
    config: CheckConfig,
}

#[derive(Default)]
struct Control {
    started: bool,
    stopped: bool,
    runtime: Option<Handle>,
    pending: Vec<Job>,
}

struct Inner {
    exporter: Arc<MetricsExporter>,
    default_config: CheckConfig,
    registry: RwLock<Registry>,
    control: Mutex<Control>,
    pool: WorkerPool,
}

/// Owns the endpoint registry and one check loop per endpoint.
///
/// Declarations are accepted with [`add_dependency`](Self::add_dependency)
/// until [`start`](Self::start); after that only
/// [`add_endpoint`](Self::add_endpoint),
/// [`remove_endpoint`](Self::remove_endpoint), and
/// [`update_endpoint`](Self::update_endpoint) change the registry.
/// Structural changes are serialized by an internal lock that is never held
/// while a probe runs.
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let control = lock(&self.inner.control);
        f.debug_struct("Scheduler")
            .field("started", &control.started)
            .field("stopped", &control.stopped)
            .field("endpoints", &self.inner.read().len())
            .field("workers", &self.inner.pool.size())
            .finish()
    }
}

impl Scheduler {
    /// A scheduler writing to `exporter`. `default_config` applies to
    /// endpoints added after start.
    pub fn new(exporter: Arc<MetricsExporter>, default_config: CheckConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                exporter,
                default_config,
                registry: RwLock::new(BTreeMap::new()),
                control: Mutex::new(Control::default()),
                pool: WorkerPool::new(),
            }),
        }
    }

    /// Config used for dynamically added endpoints.
    pub fn default_config(&self) -> &CheckConfig {
        &self.inner.default_config
    }

    /// The exporter results are written to.
    pub fn exporter(&self) -> &Arc<MetricsExporter> {
        &self.inner.exporter
    }

    /// `true` after a successful [`start`](Self::start).
    pub fn is_started(&self) -> bool {
        lock(&self.inner.control).started
    }

    /// `true` after [`stop`](Self::stop).
    pub fn is_stopped(&self) -> bool {
        lock(&self.inner.control).stopped
    }

    /// Number of registered endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.inner.read().len()
    }

    /// Current worker pool size.
    pub fn worker_count(&self) -> usize {
        self.inner.pool.size()
    }

    /// Register every endpoint of `dependency` in the unknown state.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::State`] after start; [`DepHealthError::Configuration`]
    /// when an endpoint key is already registered.
    pub fn add_dependency(&self, dependency: &Dependency, probe: Arc<dyn Probe>) -> Result<()> {
        let mut control = lock(&self.inner.control);
        if control.started || control.stopped {
            return Err(DepHealthError::state(
                "dependencies can only be added before start",
            ));
        }
        if probe.dependency_type() != dependency.dep_type() {
            warn!(
                target: TARGET,
                dependency = dependency.name(),
                declared = %dependency.dep_type(),
                probe = %probe.dependency_type(),
                "probe type differs from dependency type"
            );
        }

        let identities: Vec<EndpointIdentity> = dependency
            .endpoints()
            .iter()
            .map(|ep| {
                EndpointIdentity::new(
                    dependency.name(),
                    dependency.dep_type(),
                    dependency.critical(),
                    ep.clone(),
                )
            })
            .collect();

        let mut registry = self.inner.write();
        let mut seen = BTreeSet::new();
        for id in &identities {
            let key = id.key();
            if registry.contains_key(&key) || !seen.insert(key.clone()) {
                return Err(DepHealthError::config(format!(
                    "duplicate endpoint {key}"
                )));
            }
        }
        for id in identities {
            let state = Arc::new(EndpointState::new(id));
            registry.insert(state.key().to_string(), Arc::clone(&state));
            control.pending.push(Job {
                state,
                probe: Arc::clone(&probe),
                config: *dependency.config(),
            });
        }
        Ok(())
    }

    /// Begin checking every registered endpoint.
    ///
    /// Must be called from within a Tokio runtime; check loops are spawned
    /// on it.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::State`] when called twice, after stop, or outside
    /// a runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| {
            DepHealthError::state("start must be called from within a Tokio runtime")
        })?;
        let mut control = lock(&self.inner.control);
        if control.stopped {
            return Err(DepHealthError::state("scheduler already stopped"));
        }
        if control.started {
            return Err(DepHealthError::state("scheduler already started"));
        }
        control.started = true;
        control.runtime = Some(runtime.clone());

        let jobs = std::mem::take(&mut control.pending);
        self.inner.pool.grow_to(jobs.len());
        let dependencies: BTreeSet<&str> = jobs
            .iter()
            .map(|j| j.state.identity().dependency.as_str())
            .collect();
        info!(
            target: TARGET,
            dependencies = dependencies.len(),
            endpoints = jobs.len(),
            workers = self.inner.pool.size(),
            "scheduler started"
        );
        for job in jobs {
            Inner::spawn(&self.inner, &runtime, job);
        }
        Ok(())
    }

    /// Cancel every check loop and wait up to [`STOP_GRACE_PERIOD`] for
    /// in-flight checks. Loops still running after that are aborted.
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        let handles: Vec<ScheduleHandle> = {
            let mut control = lock(&self.inner.control);
            if control.stopped {
                return;
            }
            control.stopped = true;
            control.pending.clear();
            if !control.started {
                return;
            }
            self.inner
                .read()
                .values()
                .filter_map(|s| s.cancel(CancelReason::Stopped))
                .collect()
        };

        let aborts: Vec<_> = handles.iter().map(|h| h.task.abort_handle()).collect();
        let drain = futures::future::join_all(handles.into_iter().map(|h| h.task));
        if tokio::time::timeout(STOP_GRACE_PERIOD, drain).await.is_err() {
            warn!(
                target: TARGET,
                grace = ?STOP_GRACE_PERIOD,
                "checks still running after grace period, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }
        self.inner.pool.shutdown();
        info!(target: TARGET, "scheduler stopped");
    }

    /// Keys of endpoints that completed at least one check, mapped to
    /// their health.
    pub fn health(&self) -> BTreeMap<String, bool> {
        self.inner
            .read()
            .iter()
            .filter_map(|(k, s)| s.health().as_bool().map(|h| (k.clone(), h)))
            .collect()
    }

    /// Status snapshot of every registered endpoint, unknown ones included.
    pub fn health_details(&self) -> BTreeMap<String, EndpointStatus> {
        self.inner
            .read()
            .iter()
            .map(|(k, s)| (k.clone(), s.snapshot()))
            .collect()
    }

    /// Register and start checking one endpoint with the default config.
    /// A no-op when the key already exists.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::Configuration`] for an invalid name or endpoint;
    /// [`DepHealthError::State`] unless the scheduler is running.
    pub fn add_endpoint(
        &self,
        dependency: &str,
        dep_type: DependencyType,
        critical: bool,
        endpoint: Endpoint,
        probe: Arc<dyn Probe>,
    ) -> Result<()> {
        validate_name("dependency name", dependency)?;
        endpoint.validate()?;
        let control = lock(&self.inner.control);
        let runtime = running(&control, "add_endpoint")?;

        let identity = EndpointIdentity::new(dependency, dep_type, critical, endpoint);
        let mut registry = self.inner.write();
        if registry.contains_key(&identity.key()) {
            debug!(target: TARGET, key = %identity.key(), "endpoint already registered");
            return Ok(());
        }
        self.inner.insert(&mut registry, &runtime, identity, probe);
        Ok(())
    }

    /// Stop checking an endpoint and delete its metric series.
    /// A no-op when the key is absent.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::State`] before start.
    pub fn remove_endpoint(&self, dependency: &str, host: &str, port: &str) -> Result<()> {
        let control = lock(&self.inner.control);
        if !control.started {
            return Err(DepHealthError::state(
                "remove_endpoint requires a started scheduler",
            ));
        }
        let key = endpoint_key(dependency, host, port);
        let mut registry = self.inner.write();
        if registry.contains_key(&key) {
            self.inner.evict(&mut registry, &key);
        }
        Ok(())
    }

    /// Replace an endpoint with `endpoint`, keeping its type and
    /// criticality. Removal and addition happen under one lock.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::EndpointNotFound`] when the old key is absent;
    /// [`DepHealthError::Configuration`] for an invalid endpoint;
    /// [`DepHealthError::State`] unless the scheduler is running.
    pub fn update_endpoint(
        &self,
        dependency: &str,
        old_host: &str,
        old_port: &str,
        endpoint: Endpoint,
        probe: Arc<dyn Probe>,
    ) -> Result<()> {
        endpoint.validate()?;
        let control = lock(&self.inner.control);
        let runtime = running(&control, "update_endpoint")?;

        let old_key = endpoint_key(dependency, old_host, old_port);
        let mut registry = self.inner.write();
        let old = registry
            .get(&old_key)
            .cloned()
            .ok_or_else(|| DepHealthError::endpoint_not_found(dependency, old_host, old_port))?;
        let identity = EndpointIdentity::new(
            dependency,
            old.identity().dep_type,
            old.identity().critical,
            endpoint,
        );

        self.inner.evict(&mut registry, &old_key);
        if !registry.contains_key(&identity.key()) {
            info!(
                target: TARGET,
                from = %old_key,
                to = %identity.key(),
                "endpoint updated"
            );
            self.inner.insert(&mut registry, &runtime, identity, probe);
        }
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for state in self.inner.read().values() {
            if let Some(handle) = state.cancel(CancelReason::Dropped) {
                handle.task.abort();
            }
        }
    }
}

fn running(control: &Control, op: &str) -> Result<Handle> {
    if !control.started || control.stopped {
        return Err(DepHealthError::state(format!(
            "{op} requires a running scheduler"
        )));
    }
    control
        .runtime
        .clone()
        .ok_or_else(|| DepHealthError::state(format!("{op} requires a running scheduler")))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(
        self: &Arc<Self>,
        registry: &mut Registry,
        runtime: &Handle,
        identity: EndpointIdentity,
        probe: Arc<dyn Probe>,
    ) {
        let state = Arc::new(EndpointState::new(identity));
        let key = state.key().to_string();
        registry.insert(key.clone(), Arc::clone(&state));
        self.pool.grow_to(registry.len());
        Inner::spawn(
            self,
            runtime,
            Job {
                state,
                probe,
                config: self.default_config,
            },
        );
        info!(target: TARGET, key = %key, "endpoint added");
    }

    /// Cancel, delete metrics, then drop the entry. The order matters: a
    /// check finishing concurrently finds the entry gone and discards its
    /// result.
    fn evict(&self, registry: &mut Registry, key: &str) {
        if let Some(state) = registry.get(key) {
            state.cancel(CancelReason::Removed);
            self.exporter.delete_metrics(state.identity());
        }
        registry.remove(key);
        info!(target: TARGET, key = %key, "endpoint removed");
    }

    fn spawn(this: &Arc<Self>, runtime: &Handle, job: Job) {
        let token = CancellationToken::new();
        let state = Arc::clone(&job.state);
        let task = runtime.spawn(Arc::clone(this).run_loop(job, token.clone()));
        state.attach(ScheduleHandle { token, task });
    }

    async fn run_loop(self: Arc<Self>, job: Job, token: CancellationToken) {
        let first = tokio::time::Instant::now() + job.config.initial_delay();
        let mut ticker = tokio::time::interval_at(first, job.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_check(&job).await;
        }
        debug!(
            target: TARGET,
            key = %job.state.key(),
            reason = token.reason().map(|r| r.as_str()).unwrap_or("none"),
            "check loop finished"
        );
    }

    fn is_current(registry: &Registry, state: &Arc<EndpointState>) -> bool {
        registry
            .get(state.key())
            .is_some_and(|s| Arc::ptr_eq(s, state))
    }

    async fn run_check(&self, job: &Job) {
        let state = &job.state;
        if !Self::is_current(&self.read(), state) {
            return;
        }
        let Some(_permit) = self.pool.acquire().await else {
            return;
        };

        let started = Instant::now();
        let call = job
            .probe
            .check(&state.identity().endpoint, job.config.timeout());
        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(target: TARGET, key = %state.key(), panic = %msg, "probe panicked");
                Err(CheckError::classified(
                    StatusCategory::Error,
                    "error",
                    format!("probe panicked: {msg}"),
                ))
            }
        };
        let latency = started.elapsed();
        let result = classify(outcome.as_ref().err());

        let registry = self.read();
        if !Self::is_current(&registry, state) {
            debug!(target: TARGET, key = %state.key(), "discarding result for removed endpoint");
            return;
        }
        let id = state.identity();
        let transition = match &outcome {
            Ok(()) => state.record_success(job.config.success_threshold()),
            Err(_) => state.record_failure(job.config.failure_threshold()),
        };
        self.exporter
            .set_health(id, transition.to == HealthState::Healthy);
        self.exporter.observe_latency(id, latency);
        self.exporter.set_status(id, result.category);
        self.exporter.set_status_detail(id, &result.detail);
        let previous = state.store_result(result.clone(), latency, Utc::now());
        drop(registry);

        log_outcome(state, transition, &result, previous.as_ref(), outcome.err());
    }
}

fn log_outcome(
    state: &EndpointState,
    transition: Transition,
    result: &CheckResult,
    previous: Option<&CheckResult>,
    err: Option<CheckError>,
) {
    let id = state.identity();
    let ep = &id.endpoint;
    match err {
        None if transition.recovered() => info!(
            target: TARGET,
            dependency = %id.dependency,
            host = ep.host(),
            port = ep.port(),
            "dependency recovered"
        ),
        None => {}
        Some(e) if transition.changed() => error!(
            target: TARGET,
            dependency = %id.dependency,
            host = ep.host(),
            port = ep.port(),
            critical = id.critical,
            status = %result.category,
            detail = %result.detail,
            error = %e,
            "dependency became unhealthy"
        ),
        Some(e) if previous != Some(result) => warn!(
            target: TARGET,
            dependency = %id.dependency,
            host = ep.host(),
            port = ep.port(),
            status = %result.category,
            detail = %result.detail,
            error = %e,
            "check failed"
        ),
        Some(_) => {}
    }
}
