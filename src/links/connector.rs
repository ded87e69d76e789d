//! Link connectors
//!
//! A connector performs one connection attempt. Retry policy lives in the
//! manager, driven by the connection state machine.

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::connection::TransportKind;
use super::LinkError;

/// Where a link should connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub device_id: String,
    pub address: String,
    pub transport: TransportKind,
}

impl LinkTarget {
    /// `host:port` to dial, with any URL scheme and path removed
    pub fn socket_address(&self) -> Result<String, LinkError> {
        let rest = match self.address.split_once("://") {
            Some((_, rest)) => rest,
            None => self.address.as_str(),
        };
        let authority = rest.split('/').next().unwrap_or_default();

        if authority.is_empty() {
            return Err(LinkError::InvalidAddress(self.address.clone()));
        }
        if authority.rsplit_once(':').map_or(true, |(_, port)| port.parse::<u16>().is_err()) {
            let default_port = match (self.transport, self.address.starts_with("wss://")) {
                (TransportKind::WebSocket, true) => 443,
                (TransportKind::WebSocket, false) => 80,
                (TransportKind::Tcp, _) => {
                    return Err(LinkError::InvalidAddress(self.address.clone()))
                }
            };
            return Ok(format!("{}:{}", authority, default_port));
        }
        Ok(authority.to_string())
    }
}

/// One connection attempt to a device
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Connect and return the name the device is known by
    async fn connect(&self, target: &LinkTarget) -> Result<String, LinkError>;
}

/// Checks reachability by opening a TCP connection
#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

#[async_trait]
impl LinkConnector for TcpConnector {
    async fn connect(&self, target: &LinkTarget) -> Result<String, LinkError> {
        let address = target.socket_address()?;
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|source| LinkError::Unreachable {
                address: address.clone(),
                source,
            })?;

        let peer = stream
            .peer_addr()
            .map(|p| p.to_string())
            .unwrap_or(address);
        tracing::debug!(device_id = %target.device_id, peer = %peer, "Link reachable");
        Ok(peer)
    }
}
