//! UDP broadcast discovery.
//!
//! A [`Scanner`] runs one broadcast cycle and resolves who answered; the
//! [`DiscoveryService`] repeats it and feeds the device registry.

pub mod resolver;
pub mod scanner;
pub mod service;

pub use resolver::{parse_arp_table, ArpTableResolver, HardwareAddressResolver};
pub use scanner::{create_broadcast_socket, DiscoveredAppliance, Scanner};
pub use service::DiscoveryService;
