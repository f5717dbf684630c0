//! Camera endpoints

use crate::{ViscaError, ViscaResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// A configured camera on the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraEndpoint {
    /// Display name, not necessarily unique
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl CameraEndpoint {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port` as written in configuration
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve to the first socket address for this endpoint
    pub async fn resolve(&self) -> ViscaResult<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|_| ViscaError::AddressResolution(self.address()))?;
        addrs
            .next()
            .ok_or_else(|| ViscaError::AddressResolution(self.address()))
    }
}

impl std::fmt::Display for CameraEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.name, self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_address() {
        let endpoint = CameraEndpoint::new("Stage Left", "192.168.1.100", 52381);
        assert_eq!(endpoint.address(), "192.168.1.100:52381");
        assert_eq!(endpoint.to_string(), "Stage Left at 192.168.1.100:52381");
    }

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let endpoint = CameraEndpoint::new("Loopback", "127.0.0.1", 1259);
        let addr = endpoint.resolve().await.unwrap();
        assert_eq!(addr, "127.0.0.1:1259".parse::<SocketAddr>().unwrap());
    }
}
