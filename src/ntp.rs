//! NTP client (spec.md §2.7, §4.7 counterpart for time): one four-
//! timestamp exchange per `begin_request`, built on `wire::ntp`.
//!
//! `Instant` is injected and monotonic, not wall-clock — this client
//! treats its own `Instant::as_micros()` as era-0 timestamps for the
//! duration of one exchange, since `compute_offset` only needs all four
//! timestamps on a common base, not a true 1900 epoch (see DESIGN.md,
//! Open Questions: "NTP precision source").

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::node::{ConnectionId, StackNode};
use crate::time::Instant;
use crate::wire::ntp::{self, NtpPacket, Timestamp, MODE_CLIENT, MODE_SERVER};
use crate::wire::udp::UdpPacket;

pub const CLIENT_PORT: u16 = 123;
pub const SERVER_PORT: u16 = 123;

const TIMEOUT: core::time::Duration = core::time::Duration::from_secs(1);
const MAX_RETRIES: u8 = 3;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum State {
    Idle,
    Sent,
    Complete,
    Failed,
}

pub struct Client {
    state: State,
    t1: Timestamp,
    sent_at: Option<Instant>,
    deadline: Option<Instant>,
    retries: u8,
    offset_micros: i64,
    delay_micros: i64,
    connection_id: ConnectionId,
}

impl Client {
    pub fn new() -> Client {
        Client {
            state: State::Idle,
            t1: Timestamp::ZERO,
            sent_at: None,
            deadline: None,
            retries: 0,
            offset_micros: 0,
            delay_micros: 0,
            connection_id: 0,
        }
    }

    pub fn begin_request(&mut self, now: Instant) {
        self.state = State::Sent;
        self.sent_at = None;
        self.deadline = Some(now + TIMEOUT);
        self.retries = 0;
        debug!("ntp: request begun");
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Clock offset to apply (server time minus local time), microseconds.
    pub fn offset_micros(&self) -> Option<i64> {
        (self.state == State::Complete).then_some(self.offset_micros)
    }

    pub fn round_trip_delay_micros(&self) -> Option<i64> {
        (self.state == State::Complete).then_some(self.delay_micros)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl StackNode for Client {
    fn encapsulate(
        &mut self,
        carrier: &mut [u8],
        _off_ip: isize,
        off_frame: usize,
        now: Instant,
    ) -> Result<usize> {
        if self.state != State::Sent {
            return Ok(0);
        }
        if self.sent_at.is_some() {
            let Some(deadline) = self.deadline else {
                return Ok(0);
            };
            if now < deadline {
                return Ok(0); // request already in flight this round
            }
            if self.retries >= MAX_RETRIES {
                warn!("ntp: request timed out");
                self.state = State::Failed;
                self.deadline = None;
                return Ok(0);
            }
            self.sent_at = None; // deadline passed with retries left: re-send
        }

        let total = crate::wire::udp::HEADER_LEN + ntp::HEADER_LEN;
        if carrier.len() < off_frame + total {
            return Err(Error::ShortBuffer);
        }
        self.t1 = Timestamp::from_micros(now.as_micros());
        {
            let body_start = off_frame + crate::wire::udp::HEADER_LEN;
            let mut pkt = NtpPacket::new(&mut carrier[body_start..body_start + ntp::HEADER_LEN])?;
            pkt.set_leap_version_mode(0, 4, MODE_CLIENT);
            pkt.set_transmit_timestamp(self.t1);
        }
        {
            let mut udp = UdpPacket::new(&mut carrier[off_frame..off_frame + total])?;
            udp.set_source_port(CLIENT_PORT);
            udp.set_destination_port(SERVER_PORT);
            udp.set_length(total as u16);
            udp.set_checksum(0);
        }
        self.sent_at = Some(now);
        self.retries += 1;
        self.deadline = Some(now + TIMEOUT);
        Ok(total)
    }

    fn demux(&mut self, carrier: &[u8], off_frame: usize, now: Instant) -> Result<()> {
        if self.state != State::Sent || self.sent_at.is_none() {
            return Err(Error::PacketDrop);
        }
        let udp = UdpPacket::new(&carrier[off_frame..])?;
        if udp.destination_port() != CLIENT_PORT {
            return Err(Error::PacketDrop);
        }
        let pkt = NtpPacket::new(udp.payload())?;
        if pkt.mode() != MODE_SERVER {
            return Err(Error::PacketDrop);
        }
        if pkt.originate_timestamp() != self.t1 {
            return Err(Error::PacketDrop);
        }

        let t4 = Timestamp::from_micros(now.as_micros());
        let (offset, delay) =
            ntp::compute_offset(self.t1, pkt.receive_timestamp(), pkt.transmit_timestamp(), t4);
        self.offset_micros = offset;
        self.delay_micros = delay;
        self.state = State::Complete;
        self.deadline = None;
        self.connection_id = self.connection_id.wrapping_add(1);
        debug!("ntp: offset={}us delay={}us", offset, delay);
        Ok(())
    }

    fn local_port(&self) -> u16 {
        CLIENT_PORT
    }

    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_reply(originate: Timestamp, receive: Timestamp, transmit: Timestamp) -> [u8; 64] {
        let mut raw = [0u8; crate::wire::udp::HEADER_LEN + ntp::HEADER_LEN];
        {
            let mut udp = UdpPacket::new(&mut raw[..]).unwrap();
            udp.set_source_port(SERVER_PORT);
            udp.set_destination_port(CLIENT_PORT);
            udp.set_length(raw.len() as u16);
        }
        {
            let body = &mut raw[crate::wire::udp::HEADER_LEN..];
            let mut pkt = NtpPacket::new(body).unwrap();
            pkt.set_leap_version_mode(0, 4, MODE_SERVER);
            pkt.set_originate_timestamp(originate);
            pkt.set_receive_timestamp(receive);
            pkt.set_transmit_timestamp(transmit);
        }
        let mut out = [0u8; 64];
        out[..raw.len()].copy_from_slice(&raw);
        out
    }

    #[test]
    fn round_trip_yields_offset_and_delay() {
        let mut client = Client::new();
        client.begin_request(Instant::ZERO);
        let mut out = [0u8; 128];
        let n = client.encapsulate(&mut out, -1, 0, Instant::ZERO).unwrap();
        assert!(n > 0);
        let t1 = client.t1;

        let t2 = Timestamp::from_micros(t1.as_micros() + 1000);
        let t3 = Timestamp::from_micros(t2.as_micros() + 500);
        let reply = build_reply(t1, t2, t3);
        let now = Instant::from_micros(t1.as_micros() + 2000);
        client.demux(&reply, 0, now).unwrap();

        assert_eq!(client.state(), State::Complete);
        assert!(client.offset_micros().is_some());
        assert!(client.round_trip_delay_micros().unwrap() >= 0);
    }

    #[test]
    fn mismatched_originate_timestamp_dropped() {
        let mut client = Client::new();
        client.begin_request(Instant::ZERO);
        let mut out = [0u8; 128];
        client.encapsulate(&mut out, -1, 0, Instant::ZERO).unwrap();
        let reply = build_reply(Timestamp::from_micros(999), Timestamp::ZERO, Timestamp::ZERO);
        assert_eq!(client.demux(&reply, 0, Instant::ZERO), Err(Error::PacketDrop));
    }
}
