// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connect-only TCP probe.

use crate::error::CheckError;
use crate::probe::Probe;
use async_trait::async_trait;
use dephealth_core::{DependencyType, Endpoint};
use std::time::Duration;
use tokio::net::TcpStream;

/// Considers an endpoint healthy when a TCP connection can be established.
///
/// Also serves as the reachability probe for types that have no protocol
/// probe registered; [`TcpProbe::for_type`] sets the reported type.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    dep_type: DependencyType,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpProbe {
    /// A probe reporting [`DependencyType::Tcp`].
    #[must_use]
    pub fn new() -> Self {
        Self::for_type(DependencyType::Tcp)
    }

    /// A connect-only probe reporting `dep_type`.
    #[must_use]
    pub fn for_type(dep_type: DependencyType) -> Self {
        Self { dep_type }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, endpoint: &Endpoint, timeout: Duration) -> Result<(), CheckError> {
        let port = endpoint
            .port_number()
            .map_err(|e| CheckError::msg(e.to_string()))?;
        let connect = TcpStream::connect((endpoint.host(), port));
        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(CheckError::Io(e)),
            Err(_) => Err(CheckError::Timeout(timeout)),
        }
    }

    fn dependency_type(&self) -> DependencyType {
        self.dep_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_is_healthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ep = Endpoint::new("127.0.0.1", port.to_string());
        TcpProbe::new()
            .check(&ep, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn closed_port_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let ep = Endpoint::new("127.0.0.1", port.to_string());
        let err = TcpProbe::new()
            .check(&ep, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(classify(Some(&err)).detail, "connection_refused");
    }

    #[test]
    fn reports_configured_type() {
        assert_eq!(TcpProbe::new().dependency_type(), DependencyType::Tcp);
        assert_eq!(
            TcpProbe::for_type(DependencyType::Kafka).dependency_type(),
            DependencyType::Kafka
        );
    }
}
