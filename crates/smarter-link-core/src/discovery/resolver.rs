//! IP to hardware address resolution.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::protocol::APPLIANCE_PORT;
use crate::types::MacAddress;

/// Linux neighbour table.
pub const ARP_TABLE_PATH: &str = "/proc/net/arp";

/// Time the kernel gets to fill in the neighbour entry after a probe.
const DEFAULT_PROBE_DELAY: Duration = Duration::from_millis(500);

/// Maps a network address to the hardware address of the host behind it.
pub trait HardwareAddressResolver: Send + Sync {
    fn resolve(
        &self,
        ip: IpAddr,
    ) -> impl Future<Output = Result<MacAddress, DiscoveryError>> + Send;
}

/// Resolver backed by the kernel ARP table.
///
/// On a miss a single datagram is sent to the host so the kernel performs an
/// ARP exchange, then the table is read once more.
#[derive(Debug, Clone)]
pub struct ArpTableResolver {
    table_path: PathBuf,
    probe_port: u16,
    probe_delay: Duration,
}

impl Default for ArpTableResolver {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from(ARP_TABLE_PATH),
            probe_port: APPLIANCE_PORT,
            probe_delay: DEFAULT_PROBE_DELAY,
        }
    }
}

impl ArpTableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a different table file. Used by tests.
    pub fn with_table_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.table_path = path.into();
        self
    }

    pub fn with_probe(mut self, port: u16, delay: Duration) -> Self {
        self.probe_port = port;
        self.probe_delay = delay;
        self
    }

    async fn lookup(&self, ip: IpAddr) -> Result<Option<MacAddress>, DiscoveryError> {
        let contents = tokio::fs::read_to_string(&self.table_path)
            .await
            .map_err(|e| DiscoveryError::Resolution {
                ip,
                message: format!("cannot read {}: {}", self.table_path.display(), e),
            })?;
        Ok(parse_arp_table(&contents, ip))
    }

    async fn probe(&self, ip: IpAddr) {
        let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
        let result = match UdpSocket::bind(bind).await {
            Ok(socket) => socket.send_to(&[], (ip, self.probe_port)).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!(%ip, error = %e, "ARP probe failed");
        }
    }
}

impl HardwareAddressResolver for ArpTableResolver {
    fn resolve(
        &self,
        ip: IpAddr,
    ) -> impl Future<Output = Result<MacAddress, DiscoveryError>> + Send {
        async move {
            if let Some(mac) = self.lookup(ip).await? {
                return Ok(mac);
            }

            debug!(%ip, "not in ARP table, probing");
            self.probe(ip).await;
            tokio::time::sleep(self.probe_delay).await;

            self.lookup(ip)
                .await?
                .ok_or_else(|| DiscoveryError::Resolution {
                    ip,
                    message: "no ARP entry".to_string(),
                })
        }
    }
}

/// Find the hardware address for `ip` in `/proc/net/arp` formatted text.
///
/// Incomplete entries (flags `0x0` or an all-zero address) count as missing.
pub fn parse_arp_table(contents: &str, ip: IpAddr) -> Option<MacAddress> {
    let wanted = ip.to_string();

    contents.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != wanted || fields[2] == "0x0" {
            return None;
        }
        fields[3]
            .parse::<MacAddress>()
            .ok()
            .filter(|mac| !mac.is_zero())
    })
}
