//! Port multiplexer (spec.md §4.4.3): one per transport protocol, sitting
//! between the IP composer and a vector of transport endpoints registered
//! by `(remote_addr?, local_port)`.
//!
//! The teacher has no direct analogue (its `NetworkStack` wires one
//! `Arc<Mutex<_>>`-shared socket per listener rather than multiplexing by
//! port), so this is grounded in the ARP handler's own FIFO-table shape
//! (`arp::Handler`) generalized to a registration vector, plus the
//! `other_examples` port-table pattern (`ivmarkov-edge-net`'s per-port
//! socket maps) for the `(remote_addr?, local_port)` lookup key.

use core::net::Ipv4Addr;
use heapless::Vec;
use log::{debug, trace};

use crate::dhcp;
use crate::dns;
use crate::error::{Error, Result};
use crate::ntp;
use crate::node::StackNode;
use crate::tcp;
use crate::time::Instant;

/// Ring/retransmit-queue sizing for every TCP connection carried by this
/// crate's port multiplexers. Fixed at compile time (spec.md §3.2's
/// `Connection` is const-generic; a stack assembled from concrete types
/// needs one concrete instantiation to name in its child enums).
pub const TCP_RX_BUF: usize = 4096;
pub const TCP_TX_BUF: usize = 4096;
pub const TCP_QUEUE_DEPTH: usize = 8;

pub type TcpConnection = tcp::Connection<TCP_RX_BUF, TCP_TX_BUF, TCP_QUEUE_DEPTH>;

/// Maximum number of transport endpoints one port multiplexer carries.
pub const MAX_ENDPOINTS: usize = 8;

/// A leaf stack node living behind a port multiplexer. A closed sum type
/// rather than `dyn StackNode` (DESIGN.md, "Polymorphism") so the
/// multiplexer can call endpoint-specific inherent methods (here, only
/// `Tcp` needs one: `note_remote_addr`) alongside the uniform contract.
pub enum TransportEndpoint {
    Dhcp(dhcp::Client),
    Dns(dns::Client),
    Ntp(ntp::Client),
    Tcp(TcpConnection),
}

impl TransportEndpoint {
    pub fn local_port(&self) -> u16 {
        match self {
            TransportEndpoint::Dhcp(c) => c.local_port(),
            TransportEndpoint::Dns(c) => c.local_port(),
            TransportEndpoint::Ntp(c) => c.local_port(),
            TransportEndpoint::Tcp(c) => c.local_port(),
        }
    }

    fn encapsulate(&mut self, carrier: &mut [u8], off_ip: isize, off_frame: usize, now: Instant) -> Result<usize> {
        match self {
            TransportEndpoint::Dhcp(c) => c.encapsulate(carrier, off_ip, off_frame, now),
            TransportEndpoint::Dns(c) => c.encapsulate(carrier, off_ip, off_frame, now),
            TransportEndpoint::Ntp(c) => c.encapsulate(carrier, off_ip, off_frame, now),
            TransportEndpoint::Tcp(c) => c.encapsulate(carrier, off_ip, off_frame, now),
        }
    }

    /// Like `StackNode::demux`, but tells a passive-open TCP connection
    /// who just addressed it (see `tcp::Connection::note_remote_addr`).
    fn demux_with_source(&mut self, source: Ipv4Addr, carrier: &[u8], off_frame: usize, now: Instant) -> Result<()> {
        if let TransportEndpoint::Tcp(c) = self {
            c.note_remote_addr(source);
        }
        match self {
            TransportEndpoint::Dhcp(c) => c.demux(carrier, off_frame, now),
            TransportEndpoint::Dns(c) => c.demux(carrier, off_frame, now),
            TransportEndpoint::Ntp(c) => c.demux(carrier, off_frame, now),
            TransportEndpoint::Tcp(c) => c.demux(carrier, off_frame, now),
        }
    }

    /// The address this endpoint is currently talking to, if it knows
    /// one (spec.md §4.4.2's IP composer needs this after a successful
    /// `encapsulate` poll to address the outbound datagram). DHCP has no
    /// server address until it is bound (RFC 2131 §4.1: discover/request
    /// go out to the limited broadcast address), so it always reports
    /// that rather than `None`.
    fn remote_addr(&self) -> Option<Ipv4Addr> {
        match self {
            TransportEndpoint::Tcp(c) => c.remote_addr().map(|(addr, _)| addr),
            TransportEndpoint::Dhcp(_) => Some(Ipv4Addr::BROADCAST),
            _ => None,
        }
    }
}

struct Registration {
    remote_addr: Option<Ipv4Addr>,
    local_port: u16,
    endpoint: TransportEndpoint,
}

/// One transport protocol's worth of port-keyed endpoints.
pub struct PortMux {
    registrations: Vec<Registration, MAX_ENDPOINTS>,
    last_remote: Option<Ipv4Addr>,
}

impl PortMux {
    pub fn new() -> PortMux {
        PortMux {
            registrations: Vec::new(),
            last_remote: None,
        }
    }

    /// Registers `endpoint` under `local_port`, optionally pinned to a
    /// single `remote_addr` (spec.md §4.4.3). Fails with *duplicate* on a
    /// colliding local port (spec.md §3.1 invariant i, restricted here to
    /// the port half since every registration in one `PortMux` already
    /// shares one IP protocol number).
    pub fn register(
        &mut self,
        remote_addr: Option<Ipv4Addr>,
        local_port: u16,
        endpoint: TransportEndpoint,
    ) -> Result<()> {
        if self.registrations.iter().any(|r| r.local_port == local_port) {
            return Err(Error::Duplicate);
        }
        self.registrations
            .push(Registration {
                remote_addr,
                local_port,
                endpoint,
            })
            .map_err(|_| Error::ShortBuffer)?;
        debug!("portmux: registered port {}", local_port);
        Ok(())
    }

    pub fn endpoint_mut(&mut self, local_port: u16) -> Option<&mut TransportEndpoint> {
        self.registrations
            .iter_mut()
            .find(|r| r.local_port == local_port)
            .map(|r| &mut r.endpoint)
    }

    /// Destination address the most recently emitted datagram (from
    /// `encapsulate`) should be sent to, per the owning endpoint's own
    /// notion of its peer (spec.md §4.4.2).
    pub fn last_remote_addr(&self) -> Option<Ipv4Addr> {
        self.last_remote
    }

    /// Polls endpoints in registration order, returning the first
    /// non-zero frame (spec.md §4.4.3 and §5's "registration order, no
    /// fairness beyond that" emission-order rule).
    pub fn encapsulate(&mut self, carrier: &mut [u8], off_ip: isize, off_frame: usize, now: Instant) -> Result<usize> {
        for reg in self.registrations.iter_mut() {
            let n = reg.endpoint.encapsulate(carrier, off_ip, off_frame, now)?;
            if n > 0 {
                self.last_remote = reg.endpoint.remote_addr().or(reg.remote_addr);
                return Ok(n);
            }
        }
        Ok(0)
    }

    /// Dispatches by destination port (and, when the endpoint pinned a
    /// remote address, by source address too). `dst_port`/`src_port` are
    /// read by the caller from the first four header bytes shared by UDP
    /// and TCP.
    pub fn demux_with_source(
        &mut self,
        source: Ipv4Addr,
        dst_port: u16,
        carrier: &[u8],
        off_frame: usize,
        now: Instant,
    ) -> Result<()> {
        let Some(reg) = self.registrations.iter_mut().find(|r| r.local_port == dst_port) else {
            trace!("portmux: no registration for port {}", dst_port);
            return Err(Error::PacketDrop);
        };
        if let Some(expected) = reg.remote_addr {
            if expected != source {
                return Err(Error::PacketDrop);
            }
        }
        reg.endpoint.demux_with_source(source, carrier, off_frame, now)
    }
}

impl Default for PortMux {
    fn default() -> Self {
        Self::new()
    }
}
