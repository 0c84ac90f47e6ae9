//! ICMPv4 echo node (SPEC_FULL.md §C): answers echo requests addressed
//! to this host, the direct descendant of the teacher's own `icmp`
//! module (`src_legacy/icmp.rs`) which did the same thing over `pnet`.
//! Destination-unreachable is observed (logged) but not otherwise acted
//! on — full RFC 1122 error-passthrough to the originating transport
//! endpoint is out of scope (spec.md Non-goals).

use core::net::Ipv4Addr;
use heapless::Vec;
use log::{trace, warn};

use crate::error::{Error, Result};
use crate::node::{ConnectionId, StackNode};
use crate::time::Instant;
use crate::wire::icmpv4::{self, IcmpPacket};

/// Longest echo payload this node will mirror back; RFC 792 doesn't
/// bound it, but a no-alloc reply queue has to.
pub const MAX_ECHO_PAYLOAD: usize = 256;
const MAX_PENDING: usize = 4;

struct PendingEcho {
    source: Ipv4Addr,
    identifier: u16,
    sequence: u16,
    payload: Vec<u8, MAX_ECHO_PAYLOAD>,
}

pub struct Handler {
    pending: Vec<PendingEcho, MAX_PENDING>,
    last_reply_to: Option<Ipv4Addr>,
    generation: ConnectionId,
}

impl Handler {
    pub fn new() -> Handler {
        Handler {
            pending: Vec::new(),
            last_reply_to: None,
            generation: 0,
        }
    }

    /// The IP composer reads this right after a successful `encapsulate`
    /// poll to learn who this reply is addressed to (spec.md §4.4.2's IP
    /// composer needs the destination before it can write the header).
    pub fn last_remote_addr(&self) -> Option<Ipv4Addr> {
        self.last_reply_to
    }

    /// Like `demux`, but records the sender's IP so the eventual reply
    /// can be addressed (the bare `IcmpPacket` view has no address
    /// fields of its own — those live one layer up, in the IPv4 header
    /// the IP composer already parsed).
    pub fn demux_with_source(
        &mut self,
        source: Ipv4Addr,
        carrier: &[u8],
        off_frame: usize,
        now: Instant,
    ) -> Result<()> {
        let pkt = IcmpPacket::new(&carrier[off_frame..])?;
        if pkt.checksum_sum16() != 0 {
            return Err(Error::BadCrc);
        }
        match pkt.icmp_type() {
            icmpv4::TYPE_ECHO_REQUEST => self.queue_echo_reply(source, &pkt),
            icmpv4::TYPE_DEST_UNREACHABLE => {
                warn!("icmp: destination unreachable, code {}", pkt.code());
                Ok(())
            }
            _ => Err(Error::PacketDrop),
        }
        .map(|_| ())?;
        let _ = now;
        Ok(())
    }

    fn queue_echo_reply(&mut self, source: Ipv4Addr, pkt: &IcmpPacket<&[u8]>) -> Result<()> {
        let mut payload = Vec::new();
        let copy_len = pkt.payload().len().min(MAX_ECHO_PAYLOAD);
        payload
            .extend_from_slice(&pkt.payload()[..copy_len])
            .map_err(|_| Error::ShortBuffer)?;
        if self.pending.is_full() {
            return Err(Error::PacketDrop);
        }
        let _ = self.pending.push(PendingEcho {
            source,
            identifier: pkt.echo_identifier(),
            sequence: pkt.echo_sequence(),
            payload,
        });
        trace!(
            "icmp: echo request from {} id={:04x} seq={}",
            source,
            pkt.echo_identifier(),
            pkt.echo_sequence()
        );
        Ok(())
    }
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl StackNode for Handler {
    fn encapsulate(
        &mut self,
        carrier: &mut [u8],
        _off_ip: isize,
        off_frame: usize,
        _now: Instant,
    ) -> Result<usize> {
        let Some(echo) = self.pending.first() else {
            return Ok(0);
        };
        let total = icmpv4::HEADER_LEN + echo.payload.len();
        if carrier.len() < off_frame + total {
            return Err(Error::ShortBuffer);
        }
        {
            let mut pkt = IcmpPacket::new(&mut carrier[off_frame..off_frame + total])?;
            pkt.set_icmp_type(icmpv4::TYPE_ECHO_REPLY);
            pkt.set_code(0);
            pkt.set_echo_identifier(echo.identifier);
            pkt.set_echo_sequence(echo.sequence);
            pkt.payload_mut().copy_from_slice(&echo.payload);
            pkt.fill_checksum();
        }
        self.last_reply_to = Some(echo.source);
        self.pending.remove(0);
        Ok(total)
    }

    fn demux(&mut self, carrier: &[u8], off_frame: usize, now: Instant) -> Result<()> {
        self.demux_with_source(Ipv4Addr::UNSPECIFIED, carrier, off_frame, now)
    }

    fn protocol(&self) -> u64 {
        crate::wire::ip_protocol::ICMP as u64
    }

    fn connection_id(&self) -> ConnectionId {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8, 64> {
        let mut raw = Vec::new();
        raw.resize(icmpv4::HEADER_LEN + payload.len(), 0).unwrap();
        {
            let mut pkt = IcmpPacket::new(&mut raw[..]).unwrap();
            pkt.set_icmp_type(icmpv4::TYPE_ECHO_REQUEST);
            pkt.set_echo_identifier(identifier);
            pkt.set_echo_sequence(sequence);
            pkt.payload_mut().copy_from_slice(payload);
            pkt.fill_checksum();
        }
        raw
    }

    #[test]
    fn echo_request_queues_and_emits_reply() {
        let mut h = Handler::new();
        let req = build_echo_request(7, 1, b"ping");
        h.demux(&req, 0, Instant::ZERO).unwrap();
        let mut out = [0u8; 32];
        let n = h.encapsulate(&mut out, -1, 0, Instant::ZERO).unwrap();
        let reply = IcmpPacket::new(&out[..n]).unwrap();
        assert_eq!(reply.icmp_type(), icmpv4::TYPE_ECHO_REPLY);
        assert_eq!(reply.echo_identifier(), 7);
        assert_eq!(reply.payload(), b"ping");
        assert_eq!(reply.checksum_sum16(), 0);
    }

    #[test]
    fn bad_checksum_rejected() {
        let mut h = Handler::new();
        let mut req = build_echo_request(1, 1, b"x");
        req[2] ^= 0xff;
        assert_eq!(h.demux(&req, 0, Instant::ZERO), Err(Error::BadCrc));
    }
}
