//! Configuration surface (spec.md §6): plain structs, enumerated options,
//! no implicit defaults beyond the ones spec.md names explicitly. The
//! teacher takes configuration as constructor arguments directly
//! (`EthernetTx::new(tx, src, dst)`); this crate groups the larger option
//! sets spec.md names into structs instead, still no builder crate.

use core::net::Ipv4Addr;
use core::time::Duration;

use heapless::Vec;

use crate::addr::MacAddr;
use crate::wire::dns::{TYPE_A, TYPE_AAAA};

pub const DEFAULT_MSS: u16 = 536;
pub const DEFAULT_RTO_INITIAL: Duration = Duration::from_millis(500);
pub const DEFAULT_RTO_MAX: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// Configuration for `tcp::Connection::configure`.
#[derive(Copy, Clone, Debug)]
pub struct ConnConfig {
    pub tx_packet_queue_size: usize,
    pub mss: u16,
    pub rto_initial: Duration,
    pub rto_max: Duration,
    pub max_retries: u8,
}

impl ConnConfig {
    /// Builds a config with every optional field at the spec.md-named
    /// default, only `tx_packet_queue_size` required (spec.md §6: "≥1").
    pub fn new(tx_packet_queue_size: usize) -> ConnConfig {
        ConnConfig {
            tx_packet_queue_size: tx_packet_queue_size.max(1),
            mss: DEFAULT_MSS,
            rto_initial: DEFAULT_RTO_INITIAL,
            rto_max: DEFAULT_RTO_MAX,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_mss(mut self, mss: u16) -> ConnConfig {
        self.mss = mss;
        self
    }

    pub fn with_rto(mut self, initial: Duration, max: Duration) -> ConnConfig {
        self.rto_initial = initial;
        self.rto_max = max;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> ConnConfig {
        self.max_retries = max_retries;
        self
    }
}

/// Maximum number of octets in a DHCP client identifier (spec.md §6,
/// option 61); bounded so the option can be stored without allocation.
pub const MAX_CLIENT_ID_LEN: usize = 32;
pub const MAX_HOSTNAME_LEN: usize = 63;

/// Configuration for `dhcp::Client::begin_request`.
#[derive(Clone, Debug)]
pub struct RequestConfig {
    pub requested_addr: Option<Ipv4Addr>,
    pub client_hw_addr: MacAddr,
    pub hostname: Vec<u8, MAX_HOSTNAME_LEN>,
    pub client_id: Option<Vec<u8, MAX_CLIENT_ID_LEN>>,
}

impl RequestConfig {
    pub fn new(client_hw_addr: MacAddr) -> RequestConfig {
        RequestConfig {
            requested_addr: None,
            client_hw_addr,
            hostname: Vec::new(),
            client_id: None,
        }
    }
}

/// One question in a `dns::Client::start_resolve` call.
#[derive(Copy, Clone, Debug)]
pub struct Question<'a> {
    pub name: &'a str,
    pub qtype: u16,
}

impl<'a> Question<'a> {
    pub fn a(name: &'a str) -> Question<'a> {
        Question { name, qtype: TYPE_A }
    }

    pub fn aaaa(name: &'a str) -> Question<'a> {
        Question {
            name,
            qtype: TYPE_AAAA,
        }
    }
}

pub const MAX_QUESTIONS: usize = 4;

/// Configuration for `dns::Client::start_resolve`.
#[derive(Clone)]
pub struct ResolveConfig<'a> {
    pub questions: Vec<Question<'a>, MAX_QUESTIONS>,
    pub enable_recursion: bool,
    /// Whether to append an EDNS0 OPT additional record (spec.md §4.7).
    pub additional_opt: bool,
}

impl<'a> ResolveConfig<'a> {
    pub fn single(question: Question<'a>) -> ResolveConfig<'a> {
        let mut questions = Vec::new();
        let _ = questions.push(question);
        ResolveConfig {
            questions,
            enable_recursion: true,
            additional_opt: false,
        }
    }
}

/// Configuration for `arp::Handler::new`. `hw_type`/`proto_type` are
/// carried per spec.md §6 even though this crate only ever instantiates
/// the handler for Ethernet/IPv4 (`wire::arp::HTYPE_ETHERNET`/
/// `PTYPE_IPV4`); they are exposed rather than hardcoded so the same
/// `Handler` could serve another hardware/protocol pairing.
#[derive(Copy, Clone, Debug)]
pub struct HandlerConfig {
    pub hw_addr: MacAddr,
    pub proto_addr: Ipv4Addr,
    pub max_queries: usize,
    pub max_pending: usize,
    pub hw_type: u16,
    pub proto_type: u16,
}

impl HandlerConfig {
    pub fn new(hw_addr: MacAddr, proto_addr: Ipv4Addr) -> HandlerConfig {
        HandlerConfig {
            hw_addr,
            proto_addr,
            max_queries: 8,
            max_pending: 8,
            hw_type: crate::wire::arp::HTYPE_ETHERNET,
            proto_type: crate::wire::arp::PTYPE_IPV4,
        }
    }
}

/// Configuration for `stack::ethernet::EthernetComposer::new`. This crate
/// carries no subnet mask anywhere else in its configuration surface, so
/// every outbound IP datagram routes via `gateway_addr` rather than
/// attempting on-link ARP resolution of the datagram's own destination.
#[derive(Copy, Clone, Debug)]
pub struct InterfaceConfig {
    pub our_mac: MacAddr,
    pub our_addr: Ipv4Addr,
    pub gateway_addr: Ipv4Addr,
    pub mtu: usize,
}

impl InterfaceConfig {
    pub fn new(our_mac: MacAddr, our_addr: Ipv4Addr, gateway_addr: Ipv4Addr) -> InterfaceConfig {
        InterfaceConfig {
            our_mac,
            our_addr,
            gateway_addr,
            mtu: DEFAULT_MTU,
        }
    }

    pub fn with_mtu(mut self, mtu: usize) -> InterfaceConfig {
        self.mtu = mtu;
        self
    }
}

/// Standard Ethernet MTU (RFC 894); the composer uses this only to cap
/// the size of frames it hands back to the driver, never to fragment.
pub const DEFAULT_MTU: usize = 1500;
