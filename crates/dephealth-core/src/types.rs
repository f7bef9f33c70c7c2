// SPDX-License-Identifier: MIT OR Apache-2.0
//! The closed set of dependency types.

use crate::error::DepHealthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of external dependency being probed.
///
/// The lowercase label returned by [`DependencyType::as_str`] is emitted as
/// the `type` metric label and is part of the stable API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    /// HTTP health endpoint.
    Http,
    /// gRPC health service.
    Grpc,
    /// Plain TCP reachability.
    Tcp,
    /// PostgreSQL.
    Postgres,
    /// MySQL / MariaDB.
    Mysql,
    /// Redis.
    Redis,
    /// AMQP broker (RabbitMQ).
    Amqp,
    /// Kafka broker.
    Kafka,
    /// LDAP directory.
    Ldap,
}

impl DependencyType {
    /// Every variant, in declaration order.
    pub const ALL: [DependencyType; 9] = [
        Self::Http,
        Self::Grpc,
        Self::Tcp,
        Self::Postgres,
        Self::Mysql,
        Self::Redis,
        Self::Amqp,
        Self::Kafka,
        Self::Ldap,
    ];

    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
            Self::Tcp => "tcp",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Redis => "redis",
            Self::Amqp => "amqp",
            Self::Kafka => "kafka",
            Self::Ldap => "ldap",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = DepHealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| DepHealthError::config(format!("unknown dependency type: {s:?}")))
    }
}
