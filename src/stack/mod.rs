//! Stack assembly (spec.md §2, §4.4): the composer tree rooted at
//! `Stack`, wired `driver.read(buf) -> Stack::demux(buf)` /
//! `driver.write(buf) <- Stack::encapsulate(buf)` as the OVERVIEW
//! describes. Everything under this module is the teacher's
//! `NetworkStack` (`src_legacy/lib.rs`) generalized from one
//! hardcoded `EthernetTx`/ARP/IPv4 wiring to the composer-tree shape
//! `node::StackNode` documents.

pub mod ethernet;
pub mod ip;
pub mod portmux;

use crate::config::InterfaceConfig;
use crate::error::Result;
use crate::time::Instant;
use crate::wire::ip_protocol;
use ethernet::EthernetComposer;

pub use ethernet::LinkChild;
pub use ip::IpChild;
pub use portmux::TransportEndpoint;

/// The whole stack, as the driver sees it: one buffer in, one buffer out.
pub struct Stack {
    root: EthernetComposer,
}

impl Stack {
    pub fn new(config: InterfaceConfig) -> Stack {
        Stack {
            root: EthernetComposer::new(config),
        }
    }

    pub fn ethernet_mut(&mut self) -> &mut EthernetComposer {
        &mut self.root
    }

    /// Feeds one received frame, starting at `buf[0]`, into the tree.
    pub fn demux(&mut self, buf: &[u8], now: Instant) -> Result<()> {
        self.root.demux(buf, 0, now)
    }

    /// Polls the tree for one outbound frame, written starting at
    /// `buf[0]`. Returns the number of bytes written, or 0 if nothing is
    /// queued anywhere in the tree right now.
    pub fn encapsulate(&mut self, buf: &mut [u8], now: Instant) -> Result<usize> {
        self.root.encapsulate(buf, 0, now)
    }

    pub fn mtu(&self) -> usize {
        self.root.mtu()
    }

    pub fn arp_mut(&mut self) -> Option<&mut crate::arp::Handler> {
        self.root.arp_mut()
    }

    fn udp_endpoint_mut(&mut self, local_port: u16) -> Option<&mut TransportEndpoint> {
        let IpChild::Udp(mux) = self.root.ip_mut()?.child_mut(ip_protocol::UDP)? else {
            return None;
        };
        mux.endpoint_mut(local_port)
    }

    fn tcp_endpoint_mut(&mut self, local_port: u16) -> Option<&mut TransportEndpoint> {
        let IpChild::Tcp(mux) = self.root.ip_mut()?.child_mut(ip_protocol::TCP)? else {
            return None;
        };
        mux.endpoint_mut(local_port)
    }

    pub fn dhcp_mut(&mut self) -> Option<&mut crate::dhcp::Client> {
        match self.udp_endpoint_mut(crate::dhcp::CLIENT_PORT)? {
            TransportEndpoint::Dhcp(c) => Some(c),
            _ => None,
        }
    }

    pub fn dns_mut(&mut self) -> Option<&mut crate::dns::Client> {
        match self.udp_endpoint_mut(crate::dns::CLIENT_PORT)? {
            TransportEndpoint::Dns(c) => Some(c),
            _ => None,
        }
    }

    pub fn ntp_mut(&mut self) -> Option<&mut crate::ntp::Client> {
        match self.udp_endpoint_mut(crate::ntp::CLIENT_PORT)? {
            TransportEndpoint::Ntp(c) => Some(c),
            _ => None,
        }
    }

    pub fn tcp_mut(&mut self, local_port: u16) -> Option<&mut portmux::TcpConnection> {
        match self.tcp_endpoint_mut(local_port)? {
            TransportEndpoint::Tcp(c) => Some(c),
            _ => None,
        }
    }
}
