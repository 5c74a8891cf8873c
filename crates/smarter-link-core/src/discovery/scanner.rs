//! One broadcast discovery cycle.
//!
//! Uses SO_REUSEADDR/SO_REUSEPORT so a running bridge and a one-off CLI scan
//! can hold the discovery port at the same time.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::Serialize;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::DiscoveryError;
use crate::protocol::{discovery_request, is_discovery_reply};
use crate::types::{DeviceId, MacAddress};

use super::resolver::HardwareAddressResolver;

/// An appliance that answered a discovery broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredAppliance {
    pub network_address: IpAddr,
    pub hardware_address: MacAddress,
}

impl DiscoveredAppliance {
    pub fn id(&self) -> DeviceId {
        DeviceId::from(&self.hardware_address)
    }
}

/// Create a UDP socket with address/port reuse and broadcast enabled.
pub fn create_broadcast_socket(port: u16) -> Result<std::net::UdpSocket, std::io::Error> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;

    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    socket.set_broadcast(true)?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;

    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Broadcasts discovery requests and resolves who answered.
pub struct Scanner<R> {
    port: u16,
    target_port: u16,
    broadcast_address: Ipv4Addr,
    window: Duration,
    local_addresses: HashSet<IpAddr>,
    resolver: R,
}

impl<R: HardwareAddressResolver> Scanner<R> {
    /// Build a scanner from config. Local interface addresses are read once here.
    pub fn new(config: &BridgeConfig, resolver: R) -> Self {
        Self {
            port: config.discovery_port,
            target_port: config.discovery_port,
            broadcast_address: config.broadcast_address,
            window: config.discovery_window(),
            local_addresses: local_addresses(),
            resolver,
        }
    }

    /// Replace the set of addresses treated as this host.
    pub fn with_local_addresses(mut self, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        self.local_addresses = addresses.into_iter().collect();
        self
    }

    /// Listen on `listen_port` and send requests to `target_port`.
    /// Port 0 listens on an ephemeral port.
    pub fn with_ports(mut self, listen_port: u16, target_port: u16) -> Self {
        self.port = listen_port;
        self.target_port = target_port;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run one cycle: broadcast, collect replies until the window closes, resolve.
    pub async fn scan(&self) -> Result<Vec<DiscoveredAppliance>, DiscoveryError> {
        let socket = UdpSocket::from_std(create_broadcast_socket(self.port)?)?;
        let target = SocketAddr::V4(SocketAddrV4::new(self.broadcast_address, self.target_port));

        socket.send_to(&discovery_request(), target).await?;
        debug!(%target, window = ?self.window, "discovery request sent");

        let deadline = Instant::now() + self.window;
        let mut responders: Vec<IpAddr> = Vec::new();
        let mut buf = vec![0u8; 512];

        loop {
            match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => {
                    if let Some(ip) = self.accept(&buf[..len], from) {
                        if !responders.contains(&ip) {
                            responders.push(ip);
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "discovery receive error");
                }
                Err(_) => break,
            }
        }
        drop(socket);

        let found = self.resolve_all(responders).await;
        info!(count = found.len(), "discovery cycle finished");
        Ok(found)
    }

    /// Filter one datagram. Returns the sender when it is a coffee appliance
    /// reply from another host.
    pub fn accept(&self, datagram: &[u8], from: SocketAddr) -> Option<IpAddr> {
        if !is_discovery_reply(datagram) {
            trace!(%from, len = datagram.len(), "ignoring non-appliance datagram");
            return None;
        }
        if self.local_addresses.contains(&from.ip()) {
            trace!(%from, "ignoring reply from local address");
            return None;
        }
        Some(from.ip())
    }

    /// Resolve each responder's hardware address. Failures are logged and skipped.
    pub async fn resolve_all(
        &self,
        responders: impl IntoIterator<Item = IpAddr>,
    ) -> Vec<DiscoveredAppliance> {
        let mut found = Vec::new();
        for ip in responders {
            match self.resolver.resolve(ip).await {
                Ok(hardware_address) => found.push(DiscoveredAppliance {
                    network_address: ip,
                    hardware_address,
                }),
                Err(e) => warn!(%ip, error = %e, "hardware address resolution failed"),
            }
        }
        found
    }
}

fn local_addresses() -> HashSet<IpAddr> {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces.into_iter().map(|(_name, ip)| ip).collect(),
        Err(e) => {
            debug!(error = %e, "failed to list network interfaces");
            HashSet::new()
        }
    }
}
