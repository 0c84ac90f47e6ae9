//! DHCPv4 client (spec.md §2.5, §4.6): INIT → SELECTING → REQUESTING →
//! BOUND, built on `wire::dhcpv4`. Always bound to UDP port 68, talking
//! to port 67 (RFC 2131 §4.1).
//!
//! Grounded in the teacher's `arp::Handler` retry/timeout shape (a single
//! in-flight request with a deadline, re-armed by the caller rather than
//! an internal timer thread) rather than in any teacher DHCP code — the
//! teacher never had one. The option surface and state names come
//! straight from RFC 2131 Figure 5.

use core::net::Ipv4Addr;
use core::time::Duration;
use heapless::Vec;
use log::{debug, warn};

use crate::addr::MacAddr;
use crate::config::RequestConfig;
use crate::error::{Error, Result};
use crate::node::{ConnectionId, StackNode};
use crate::time::Instant;
use crate::wire::dhcpv4::{self, option, DhcpPacket, MessageType};
use crate::wire::udp::UdpPacket;

pub const CLIENT_PORT: u16 = 68;
pub const SERVER_PORT: u16 = 67;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);
const MAX_RETRIES: u8 = 4;

/// DHCP client lifecycle states (RFC 2131 Figure 5, the subset this
/// client drives through).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum State {
    Init,
    Selecting,
    Requesting,
    Bound,
    Nak,
}

#[derive(Clone, Copy, Default)]
struct Lease {
    yiaddr: Ipv4Addr,
    subnet_mask: Option<Ipv4Addr>,
    router: Option<Ipv4Addr>,
    dns: Option<Ipv4Addr>,
    server_id: Ipv4Addr,
    lease_secs: u32,
}

impl Lease {
    fn empty() -> Lease {
        Lease {
            yiaddr: Ipv4Addr::UNSPECIFIED,
            subnet_mask: None,
            router: None,
            dns: None,
            server_id: Ipv4Addr::UNSPECIFIED,
            lease_secs: 0,
        }
    }
}

pub struct Client {
    state: State,
    config: Option<RequestConfig>,
    xid: u32,
    retries: u8,
    deadline: Option<Instant>,
    lease: Lease,
    connection_id: ConnectionId,
}

impl Client {
    pub fn new() -> Client {
        Client {
            state: State::Init,
            config: None,
            xid: 0,
            retries: 0,
            deadline: None,
            lease: Lease::empty(),
            connection_id: 0,
        }
    }

    /// Starts a DISCOVER/REQUEST cycle using `xid` as the transaction id
    /// (caller-supplied so it can be a PRNG seed outside this crate).
    pub fn begin_request(&mut self, config: RequestConfig, xid: u32, now: Instant) -> Result<()> {
        self.config = Some(config);
        self.xid = xid;
        self.retries = 0;
        self.state = State::Selecting;
        self.deadline = Some(now + DEFAULT_TIMEOUT);
        self.lease = Lease::empty();
        debug!("dhcp: xid={:08x} -> SELECTING", xid);
        Ok(())
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn assigned_addr(&self) -> Option<Ipv4Addr> {
        (self.state == State::Bound).then_some(self.lease.yiaddr)
    }

    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        (self.state == State::Bound).then_some(self.lease.subnet_mask).flatten()
    }

    pub fn router_addr(&self) -> Option<Ipv4Addr> {
        (self.state == State::Bound).then_some(self.lease.router).flatten()
    }

    pub fn dns_server_first(&self) -> Option<Ipv4Addr> {
        (self.state == State::Bound).then_some(self.lease.dns).flatten()
    }

    pub fn lease_seconds(&self) -> Option<u32> {
        (self.state == State::Bound).then_some(self.lease.lease_secs)
    }

    fn write_message(
        &self,
        carrier: &mut [u8],
        off_frame: usize,
        msg_type: MessageType,
        request_addr: Option<Ipv4Addr>,
        ciaddr: Ipv4Addr,
    ) -> Result<usize> {
        let config = self.config.as_ref().ok_or(Error::NotConfigured)?;
        let body_len = dhcpv4::MIN_LEN + estimate_options_len(config, request_addr);
        let total = crate::wire::udp::HEADER_LEN + body_len;
        if carrier.len() < off_frame + total {
            return Err(Error::ShortBuffer);
        }
        {
            let mut udp = UdpPacket::new(&mut carrier[off_frame..off_frame + total])?;
            udp.set_source_port(CLIENT_PORT);
            udp.set_destination_port(SERVER_PORT);
            udp.set_length(total as u16);
            udp.set_checksum(0);
        }
        let body = &mut carrier[off_frame + crate::wire::udp::HEADER_LEN..off_frame + total];
        let mut pkt = DhcpPacket::new(body)?;
        pkt.set_op(dhcpv4::OP_BOOTREQUEST);
        pkt.set_htype_hlen_hops();
        pkt.set_xid(self.xid);
        pkt.set_broadcast(true);
        pkt.set_ciaddr(ciaddr);
        pkt.set_chaddr(config.client_hw_addr);
        pkt.set_magic_cookie();

        let mut off = pkt.write_option(0, option::MESSAGE_TYPE, &[u8::from(msg_type)]);
        if let Some(addr) = request_addr {
            off = pkt.write_option(off, option::REQUESTED_IP, &addr.octets());
        }
        if !config.hostname.is_empty() {
            off = pkt.write_option(off, option::HOST_NAME, &config.hostname);
        }
        if let Some(id) = &config.client_id {
            off = pkt.write_option(off, option::CLIENT_ID, id);
        }
        let params = [
            option::SUBNET_MASK,
            option::ROUTER,
            option::DNS,
            option::BROADCAST,
            option::LEASE_TIME,
        ];
        off = pkt.write_option(off, option::PARAMETER_REQUEST_LIST, &params);
        pkt.write_end(off);

        Ok(total)
    }

    fn read_lease_fields(&mut self, pkt: &DhcpPacket<&[u8]>) {
        self.lease.yiaddr = pkt.yiaddr();
        if let Some(mask) = pkt.find_option(option::SUBNET_MASK, 16) {
            if mask.len() == 4 {
                self.lease.subnet_mask = Some(Ipv4Addr::new(mask[0], mask[1], mask[2], mask[3]));
            }
        }
        if let Some(router) = pkt.find_option(option::ROUTER, 16) {
            if router.len() >= 4 {
                self.lease.router = Some(Ipv4Addr::new(router[0], router[1], router[2], router[3]));
            }
        }
        if let Some(dns) = pkt.find_option(option::DNS, 16) {
            if dns.len() >= 4 {
                self.lease.dns = Some(Ipv4Addr::new(dns[0], dns[1], dns[2], dns[3]));
            }
        }
        if let Some(server_id) = pkt.find_option(option::SERVER_ID, 16) {
            if server_id.len() == 4 {
                self.lease.server_id =
                    Ipv4Addr::new(server_id[0], server_id[1], server_id[2], server_id[3]);
            }
        }
        if let Some(lease) = pkt.find_option(option::LEASE_TIME, 16) {
            if lease.len() == 4 {
                self.lease.lease_secs = u32::from_be_bytes(lease.try_into().unwrap());
            }
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact size of the options block `write_message` is about to write, so
/// the buffer-length check happens before any `write_option` call.
fn estimate_options_len(config: &RequestConfig, request_addr: Option<Ipv4Addr>) -> usize {
    let mut n = 2 + 1; // message type TLV
    if request_addr.is_some() {
        n += 2 + 4;
    }
    if !config.hostname.is_empty() {
        n += 2 + config.hostname.len();
    }
    if let Some(id) = &config.client_id {
        n += 2 + id.len();
    }
    n += 2 + 5; // parameter request list
    n + 1 // end
}

impl StackNode for Client {
    fn encapsulate(
        &mut self,
        carrier: &mut [u8],
        _off_ip: isize,
        off_frame: usize,
        now: Instant,
    ) -> Result<usize> {
        if self.deadline.map_or(false, |d| now >= d) {
            if self.retries >= MAX_RETRIES {
                warn!("dhcp: giving up after {} retries", self.retries);
                self.state = State::Init;
                self.deadline = None;
                return Ok(0);
            }
            self.retries += 1;
            self.deadline = Some(now + DEFAULT_TIMEOUT);
        } else if self.state == State::Bound || self.state == State::Nak || self.state == State::Init {
            return Ok(0);
        } else if self.deadline.is_some() {
            return Ok(0); // already sent this round, waiting
        }

        match self.state {
            State::Selecting => {
                let requested = self.config.as_ref().and_then(|c| c.requested_addr);
                self.write_message(carrier, off_frame, MessageType::Discover, requested, Ipv4Addr::UNSPECIFIED)
            }
            State::Requesting => {
                let addr = self.lease.yiaddr;
                self.write_message(carrier, off_frame, MessageType::Request, Some(addr), Ipv4Addr::UNSPECIFIED)
            }
            _ => Ok(0),
        }
    }

    fn demux(&mut self, carrier: &[u8], off_frame: usize, now: Instant) -> Result<()> {
        let udp = UdpPacket::new(&carrier[off_frame..])?;
        if udp.destination_port() != CLIENT_PORT {
            return Err(Error::PacketDrop);
        }
        let body = udp.payload();
        let pkt = DhcpPacket::new(body)?;
        pkt.validate_magic_cookie()?;
        if pkt.xid() != self.xid {
            return Err(Error::PacketDrop);
        }
        let Some(msg_type) = pkt.message_type(16) else {
            return Err(Error::InvalidField);
        };

        match (self.state, msg_type) {
            (State::Selecting, MessageType::Offer) => {
                self.read_lease_fields(&pkt);
                self.state = State::Requesting;
                self.deadline = Some(now + DEFAULT_TIMEOUT);
                self.retries = 0;
                debug!("dhcp: offer {} -> REQUESTING", self.lease.yiaddr);
                Ok(())
            }
            (State::Requesting, MessageType::Ack) => {
                self.read_lease_fields(&pkt);
                self.state = State::Bound;
                self.deadline = None;
                self.connection_id = self.connection_id.wrapping_add(1);
                debug!("dhcp: bound {}", self.lease.yiaddr);
                Ok(())
            }
            (State::Requesting, MessageType::Nak) => {
                warn!("dhcp: NAK received");
                self.state = State::Nak;
                self.deadline = None;
                Ok(())
            }
            _ => Err(Error::PacketDrop),
        }
    }

    fn local_port(&self) -> u16 {
        CLIENT_PORT
    }

    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}
