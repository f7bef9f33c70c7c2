// SPDX-License-Identifier: MIT OR Apache-2.0
//! Staged construction of a [`DepHealth`] engine.

use crate::engine::DepHealth;
use crate::options::DependencyOptions;
use crate::settings::{Defaults, DependencySettings, resolve};
use dephealth_check::{HttpProbe, HttpProbeConfig, Probe, TcpProbe};
use dephealth_config::{DepHealthConfig, Environment, NAME_VAR, validate_config};
use dephealth_core::{DepHealthError, DependencyType, Result, endpoint_key, validate_name};
use dephealth_metrics::MetricsExporter;
use dephealth_scheduler::Scheduler;
use prometheus::Registry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TARGET: &str = "dephealth.builder";

/// Constructor for probes of one dependency type.
pub type ProbeFactory =
    Arc<dyn Fn(&DependencySettings) -> Result<Arc<dyn Probe>> + Send + Sync>;

/// Probe used when neither an explicit probe nor a factory applies:
/// [`HttpProbe`] for `http`, a TCP reachability probe for everything else.
///
/// # Errors
///
/// [`DepHealthError::Configuration`] when the HTTP client cannot be built.
pub fn builtin_probe(settings: &DependencySettings) -> Result<Arc<dyn Probe>> {
    if let Some(http) = settings.http() {
        let probe = HttpProbe::new(HttpProbeConfig {
            health_path: http.health_path.clone(),
            tls: http.tls,
            tls_skip_verify: http.tls_skip_verify,
            headers: http.headers.clone(),
            bearer_token: http.bearer_token.clone(),
            basic_auth: http.basic_auth.clone(),
        })?;
        return Ok(Arc::new(probe));
    }
    if settings.dep_type() != DependencyType::Tcp {
        debug!(
            target: TARGET,
            dependency = settings.name(),
            dep_type = %settings.dep_type(),
            "no probe factory registered, using TCP reachability"
        );
    }
    Ok(Arc::new(TcpProbe::for_type(settings.dep_type())))
}

struct Entry {
    name: String,
    dep_type: DependencyType,
    options: DependencyOptions,
    probe: Option<Arc<dyn Probe>>,
}

/// Accumulates declarations; [`build`](Self::build) validates everything and
/// wires the exporter and scheduler.
///
/// Nothing touches the metrics registry until every declaration has been
/// resolved, so a failed build leaves the registry untouched.
#[must_use]
pub struct DepHealthBuilder {
    name: String,
    group: String,
    registry: Registry,
    defaults: Defaults,
    environment: Environment,
    factories: BTreeMap<DependencyType, ProbeFactory>,
    entries: Vec<Entry>,
}

impl fmt::Debug for DepHealthBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepHealthBuilder")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("defaults", &self.defaults)
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field(
                "dependencies",
                &self.entries.iter().map(|e| &e.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl DepHealthBuilder {
    pub(crate) fn new(name: impl Into<String>, group: impl Into<String>, registry: &Registry) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            registry: registry.clone(),
            defaults: Defaults::default(),
            environment: Environment::from_process(),
            factories: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    /// Start from a parsed configuration file.
    ///
    /// The document is validated first; warnings are logged. Name and group
    /// come from the file and may be replaced with [`name`](Self::name) and
    /// [`group`](Self::group).
    ///
    /// # Errors
    ///
    /// [`DepHealthError::Configuration`] when validation fails.
    pub fn from_config(config: &DepHealthConfig, registry: &Registry) -> Result<Self> {
        let warnings = validate_config(config)?;
        for warning in &warnings {
            warn!(target: TARGET, %warning, "configuration warning");
        }
        let mut builder = Self::new(
            config.name.clone().unwrap_or_default(),
            config.group.clone().unwrap_or_default(),
            registry,
        );
        builder.defaults = Defaults {
            interval: config.check_interval(),
            timeout: config.timeout(),
            initial_delay: config.initial_delay(),
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
        };
        for (name, dep) in &config.dependencies {
            builder = builder.dependency_options(name, dep.dep_type, DependencyOptions::from(dep));
        }
        Ok(builder)
    }

    /// Application name. Empty falls back to `DEPHEALTH_NAME`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Application group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Default interval for every dependency.
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.defaults.interval = Some(interval);
        self
    }

    /// Default timeout for every dependency.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Default delay before the first check of declared dependencies.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.defaults.initial_delay = Some(delay);
        self
    }

    /// Default failure threshold.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.defaults.failure_threshold = Some(n);
        self
    }

    /// Default success threshold.
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.defaults.success_threshold = Some(n);
        self
    }

    /// Replace the environment snapshot used for overlays. Defaults to the
    /// process environment captured when the builder was created.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Register a probe constructor for every `dep_type` dependency declared
    /// without an explicit probe.
    pub fn probe_factory<F>(mut self, dep_type: DependencyType, factory: F) -> Self
    where
        F: Fn(&DependencySettings) -> Result<Arc<dyn Probe>> + Send + Sync + 'static,
    {
        self.factories.insert(dep_type, Arc::new(factory));
        self
    }

    /// Declare a dependency whose probe is derived from its type.
    pub fn dependency<F>(self, name: impl Into<String>, dep_type: DependencyType, configure: F) -> Self
    where
        F: FnOnce(DependencyOptions) -> DependencyOptions,
    {
        self.push(name.into(), dep_type, configure(DependencyOptions::new()), None)
    }

    /// Declare a dependency checked by `probe`.
    pub fn dependency_with_probe<F>(
        self,
        name: impl Into<String>,
        dep_type: DependencyType,
        probe: Arc<dyn Probe>,
        configure: F,
    ) -> Self
    where
        F: FnOnce(DependencyOptions) -> DependencyOptions,
    {
        self.push(
            name.into(),
            dep_type,
            configure(DependencyOptions::new()),
            Some(probe),
        )
    }

    /// Declare a dependency from prepared options.
    pub fn dependency_options(
        self,
        name: impl Into<String>,
        dep_type: DependencyType,
        options: DependencyOptions,
    ) -> Self {
        self.push(name.into(), dep_type, options, None)
    }

    fn push(
        mut self,
        name: String,
        dep_type: DependencyType,
        options: DependencyOptions,
        probe: Option<Arc<dyn Probe>>,
    ) -> Self {
        self.entries.push(Entry {
            name,
            dep_type,
            options,
            probe,
        });
        self
    }

    fn resolve_name(&self) -> Result<String> {
        let name = if self.name.is_empty() {
            self.environment
                .app_name()
                .map(str::to_string)
                .ok_or_else(|| {
                    DepHealthError::config(format!(
                        "instance name is required: pass it to the builder or set {NAME_VAR}"
                    ))
                })?
        } else {
            self.name.clone()
        };
        validate_name("instance name", &name)?;
        Ok(name)
    }

    fn probe_for(&self, entry: &Entry, settings: &DependencySettings) -> Result<Arc<dyn Probe>> {
        if let Some(probe) = &entry.probe {
            return Ok(Arc::clone(probe));
        }
        match self.factories.get(&entry.dep_type) {
            Some(factory) => factory(settings),
            None => builtin_probe(settings),
        }
    }

    /// Validate every declaration and wire the engine.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::Configuration`] for any invalid declaration,
    /// duplicate dependency, or duplicate endpoint;
    /// [`DepHealthError::Metrics`] when the registry already holds the
    /// dephealth families.
    pub fn build(self) -> Result<DepHealth> {
        let name = self.resolve_name()?;
        validate_name("instance group", &self.group)?;
        let dynamic_config = self.defaults.dynamic_config()?;

        let mut names = BTreeSet::new();
        let mut keys = BTreeSet::new();
        let mut resolved = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !names.insert(entry.name.as_str()) {
                return Err(DepHealthError::config(format!(
                    "dependency {:?} declared more than once",
                    entry.name
                )));
            }
            let settings = resolve(
                &entry.name,
                entry.dep_type,
                &entry.options,
                &self.environment,
                &self.defaults,
            )?;
            for ep in settings.endpoints() {
                let key = endpoint_key(settings.name(), ep.host(), ep.port());
                if !keys.insert(key.clone()) {
                    return Err(DepHealthError::config(format!(
                        "endpoint {key} declared more than once"
                    )));
                }
            }
            let probe = self.probe_for(entry, &settings)?;
            resolved.push((settings, probe));
        }

        let label_keys: BTreeSet<String> = resolved
            .iter()
            .flat_map(|(s, _)| s.labels().keys().cloned())
            .collect();
        let exporter = Arc::new(MetricsExporter::new(
            &self.registry,
            &name,
            &self.group,
            label_keys,
        )?);
        let scheduler = Scheduler::new(exporter, dynamic_config);

        let mut settings = BTreeMap::new();
        for (s, probe) in resolved {
            scheduler.add_dependency(s.dependency(), probe)?;
            settings.insert(s.name().to_string(), s);
        }
        info!(
            target: TARGET,
            name = %name,
            group = %self.group,
            dependencies = settings.len(),
            endpoints = scheduler.endpoint_count(),
            "dephealth built"
        );
        Ok(DepHealth::new(name, self.group, scheduler, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dephealth_core::Endpoint;

    fn builder() -> DepHealthBuilder {
        DepHealth::builder("svc", "team", &Registry::new()).environment(Environment::empty())
    }

    #[test]
    fn name_falls_back_to_env() {
        let dh = DepHealth::builder("", "team", &Registry::new())
            .environment(Environment::from_pairs([(NAME_VAR, "from-env")]))
            .build()
            .unwrap();
        assert_eq!(dh.name(), "from-env");
    }

    #[test]
    fn missing_name_is_rejected() {
        let err = DepHealth::builder("", "team", &Registry::new())
            .environment(Environment::empty())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains(NAME_VAR));
    }

    #[test]
    fn invalid_group_is_rejected() {
        let err = builder().group("Team").build().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn duplicate_dependency_is_rejected() {
        let err = builder()
            .dependency("db", DependencyType::Tcp, |d| d.host_port("h", "1").critical(true))
            .dependency("db", DependencyType::Tcp, |d| d.host_port("h", "2").critical(true))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn failed_build_leaves_registry_untouched() {
        let registry = Registry::new();
        let err = DepHealth::builder("svc", "team", &registry)
            .environment(Environment::empty())
            .dependency("ok", DependencyType::Tcp, |d| d.host_port("h", "1").critical(true))
            .dependency("bad", DependencyType::Tcp, |d| d.host_port("h", "0").critical(true))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        // A second build on the same registry would fail if collectors had
        // been registered.
        DepHealth::builder("svc", "team", &registry)
            .environment(Environment::empty())
            .build()
            .unwrap();
    }

    #[test]
    fn factory_is_used_for_its_type_only() {
        let dh = builder()
            .probe_factory(DependencyType::Redis, |s| {
                assert_eq!(s.redis().unwrap().db, Some(2));
                Ok(Arc::new(TcpProbe::for_type(DependencyType::Redis)) as Arc<dyn Probe>)
            })
            .dependency("cache", DependencyType::Redis, |d| {
                d.url("redis://cache:6379/2").critical(false)
            })
            .build()
            .unwrap();
        assert_eq!(dh.settings("cache").unwrap().endpoints(), &[Endpoint::new("cache", "6379")]);
    }

    #[test]
    fn factory_errors_abort_the_build() {
        let err = builder()
            .probe_factory(DependencyType::Tcp, |_| Err(DepHealthError::config("nope")))
            .dependency("t", DependencyType::Tcp, |d| d.host_port("h", "1").critical(true))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn custom_label_keys_are_the_sorted_union() {
        let dh = builder()
            .dependency("a", DependencyType::Tcp, |d| {
                d.host_port("h", "1").critical(true).label("zone", "1")
            })
            .dependency("b", DependencyType::Tcp, |d| {
                d.host_port("h", "2").critical(true).label("env", "x").label("zone", "2")
            })
            .build()
            .unwrap();
        assert_eq!(dh.custom_label_keys(), ["env", "zone"]);
    }

    #[test]
    fn builtin_probe_types() {
        let dh = builder()
            .dependency("api", DependencyType::Http, |d| d.url("http://api:8080").critical(true))
            .build()
            .unwrap();
        let probe = builtin_probe(dh.settings("api").unwrap()).unwrap();
        assert_eq!(probe.dependency_type(), DependencyType::Http);
    }
}
