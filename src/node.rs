//! The stack node contract (spec.md §2.3, §4, §6) that every composer and
//! leaf (ARP handler, DHCP/DNS/NTP client, TCP connection) implements.
//!
//! The teacher modeled this split as a pair of traits, `EthernetListener`/
//! `Ipv4Listener` on the receive side and `*Tx` structs (not a trait) on
//! the send side, with a parent composer owning `Box<dyn Listener>` in a
//! `HashMap`. Per DESIGN.md ("Polymorphism"), this crate folds both
//! directions into one trait, and every composer holds its children as
//! an owned sum type (`stack::LinkChild`, `stack::IpChild`,
//! `stack::TransportEndpoint`) in a bounded `heapless::Vec` instead of a
//! `HashMap` of trait objects.

use crate::time::Instant;

/// Generation counter exposed by every node. Any change invalidates a
/// caller that cached a reference to this node's identity (spec.md
/// §3.1, "Connection ID" in the glossary).
pub type ConnectionId = u64;

/// `off_ip == NO_IP_HEADER` signals "no enclosing IP header yet" at
/// compose time (spec.md §6).
pub const NO_IP_HEADER: isize = -1;

/// The uniform contract every node in the stack tree implements.
///
/// `encapsulate`/`demux` are re-entrant across different frames but are
/// never invoked concurrently on the same node (spec.md §3.1, invariant
/// iii; §5).
pub trait StackNode {
    /// Fills `carrier[off_frame..]` with this node's next outbound frame
    /// (its own header, plus any child headers already laid in one layer
    /// down), returning the total length written including this node's
    /// header. Returns `Ok(0)` when there is nothing to send right now.
    fn encapsulate(
        &mut self,
        carrier: &mut [u8],
        off_ip: isize,
        off_frame: usize,
        now: Instant,
    ) -> crate::error::Result<usize>;

    /// Parses the frame at `off_frame` and forwards the inner payload to
    /// whichever child matches this node's selector (EtherType, IP
    /// protocol number, or port).
    fn demux(&mut self, carrier: &[u8], off_frame: usize, now: Instant) -> crate::error::Result<()>;

    /// The transport endpoint's bound local port, or 0 for nodes that are
    /// not transport endpoints.
    fn local_port(&self) -> u16 {
        0
    }

    /// The link-layer EtherType or IP-protocol number this node owns, or
    /// 0 if neither applies (e.g. a transport endpoint, selected instead
    /// by `local_port` within its port multiplexer).
    fn protocol(&self) -> u64 {
        0
    }

    /// A stable reference to this node's generation counter.
    fn connection_id(&self) -> ConnectionId;
}
