// SPDX-License-Identifier: MIT OR Apache-2.0
//! A named group of endpoints sharing a type, criticality, and check config.

use crate::config::CheckConfig;
use crate::endpoint::{Endpoint, validate_name};
use crate::error::{DepHealthError, Result};
use crate::types::DependencyType;

/// A validated dependency declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    name: String,
    dep_type: DependencyType,
    critical: bool,
    endpoints: Vec<Endpoint>,
    config: CheckConfig,
}

impl Dependency {
    /// Start a builder. `critical` must be set before [`DependencyBuilder::build`].
    #[must_use]
    pub fn builder(name: impl Into<String>, dep_type: DependencyType) -> DependencyBuilder {
        DependencyBuilder {
            name: name.into(),
            dep_type,
            critical: None,
            endpoints: Vec::new(),
            config: CheckConfig::default(),
        }
    }

    /// Dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dependency type.
    pub fn dep_type(&self) -> DependencyType {
        self.dep_type
    }

    /// Whether unhealthiness should block readiness.
    pub fn critical(&self) -> bool {
        self.critical
    }

    /// Endpoints in declaration order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Check configuration.
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }
}

/// Builder for [`Dependency`].
#[derive(Debug, Clone)]
pub struct DependencyBuilder {
    name: String,
    dep_type: DependencyType,
    critical: Option<bool>,
    endpoints: Vec<Endpoint>,
    config: CheckConfig,
}

impl DependencyBuilder {
    /// Set criticality. Required.
    #[must_use]
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    /// Append one endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Append several endpoints.
    #[must_use]
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    /// Set the check configuration.
    #[must_use]
    pub fn config(mut self, config: CheckConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and freeze.
    ///
    /// # Errors
    ///
    /// [`DepHealthError::Configuration`] for an invalid name, a missing
    /// `critical` flag, an empty endpoint list, or an invalid endpoint.
    pub fn build(self) -> Result<Dependency> {
        validate_name("dependency name", &self.name)?;
        let critical = self.critical.ok_or_else(|| {
            DepHealthError::config(format!(
                "dependency {:?}: critical must be set explicitly",
                self.name
            ))
        })?;
        if self.endpoints.is_empty() {
            return Err(DepHealthError::config(format!(
                "dependency {:?}: at least one endpoint is required",
                self.name
            )));
        }
        for ep in &self.endpoints {
            ep.validate().map_err(|e| match e {
                DepHealthError::Configuration { reason } => {
                    DepHealthError::config(format!("dependency {:?}: {reason}", self.name))
                }
                other => other,
            })?;
        }
        Ok(Dependency {
            name: self.name,
            dep_type: self.dep_type,
            critical,
            endpoints: self.endpoints,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep() -> Endpoint {
        Endpoint::new("db.local", "5432")
    }

    #[test]
    fn builds_valid_dependency() {
        let dep = Dependency::builder("postgres-main", DependencyType::Postgres)
            .critical(true)
            .endpoint(ep())
            .build()
            .unwrap();
        assert_eq!(dep.name(), "postgres-main");
        assert_eq!(dep.dep_type(), DependencyType::Postgres);
        assert!(dep.critical());
        assert_eq!(dep.endpoints().len(), 1);
        assert_eq!(dep.config(), &CheckConfig::default());
    }

    #[test]
    fn missing_critical_is_rejected() {
        let err = Dependency::builder("db", DependencyType::Postgres)
            .endpoint(ep())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("critical must be set"));
    }

    #[test]
    fn empty_endpoints_rejected() {
        let err = Dependency::builder("db", DependencyType::Postgres)
            .critical(false)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("at least one endpoint"));
    }

    #[test]
    fn invalid_name_rejected() {
        assert!(
            Dependency::builder("Bad_Name", DependencyType::Tcp)
                .critical(false)
                .endpoint(ep())
                .build()
                .is_err()
        );
    }

    #[test]
    fn endpoint_errors_name_the_dependency() {
        let err = Dependency::builder("cache", DependencyType::Redis)
            .critical(false)
            .endpoint(Endpoint::new("r", "0"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("\"cache\""));
    }
}
