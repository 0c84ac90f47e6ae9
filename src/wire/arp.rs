//! ARP wire view (RFC 826) with variable hardware/protocol address
//! lengths. This crate only ever instantiates it for Ethernet/IPv4
//! (HLEN=6, PLEN=4), but the view itself is general per spec.md §4.1.

use core::net::Ipv4Addr;

use crate::addr::MacAddr;
use crate::error::{Error, Result};

pub const MIN_HEADER_LEN: usize = 8;

pub const HTYPE_ETHERNET: u16 = 1;
pub const PTYPE_IPV4: u16 = 0x0800;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Operation {
    Request,
    Reply,
    Unknown(u16),
}

impl Operation {
    fn from_u16(v: u16) -> Operation {
        match v {
            1 => Operation::Request,
            2 => Operation::Reply,
            other => Operation::Unknown(other),
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Operation::Request => 1,
            Operation::Reply => 2,
            Operation::Unknown(v) => v,
        }
    }
}

pub struct ArpPacket<T: AsRef<[u8]>> {
    buf: T,
}

impl<T: AsRef<[u8]>> ArpPacket<T> {
    pub fn new(buf: T) -> Result<Self> {
        if buf.as_ref().len() < MIN_HEADER_LEN {
            return Err(Error::ShortBuffer);
        }
        let pkt = ArpPacket { buf };
        if pkt.buf.as_ref().len() < pkt.total_len() {
            return Err(Error::ShortBuffer);
        }
        Ok(pkt)
    }

    pub fn hardware_type(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[0..2].try_into().unwrap())
    }

    pub fn protocol_type(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[2..4].try_into().unwrap())
    }

    pub fn hw_len(&self) -> u8 {
        self.buf.as_ref()[4]
    }

    pub fn proto_len(&self) -> u8 {
        self.buf.as_ref()[5]
    }

    pub fn operation(&self) -> Operation {
        Operation::from_u16(u16::from_be_bytes(
            self.buf.as_ref()[6..8].try_into().unwrap(),
        ))
    }

    fn total_len(&self) -> usize {
        MIN_HEADER_LEN + 2 * (self.hw_len() as usize + self.proto_len() as usize)
    }

    // The Ethernet/IPv4 accessors below assume HLEN=6, PLEN=4, which is
    // all this crate ever constructs or expects on receive.
    pub fn sender_hw_addr(&self) -> MacAddr {
        MacAddr::from_bytes(&self.buf.as_ref()[8..14]).expect("slice is 6 bytes")
    }

    pub fn sender_proto_addr(&self) -> Ipv4Addr {
        let b = &self.buf.as_ref()[14..18];
        Ipv4Addr::new(b[0], b[1], b[2], b[3])
    }

    pub fn target_hw_addr(&self) -> MacAddr {
        MacAddr::from_bytes(&self.buf.as_ref()[18..24]).expect("slice is 6 bytes")
    }

    pub fn target_proto_addr(&self) -> Ipv4Addr {
        let b = &self.buf.as_ref()[24..28];
        Ipv4Addr::new(b[0], b[1], b[2], b[3])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> ArpPacket<T> {
    pub fn set_hardware_type(&mut self, v: u16) {
        self.buf.as_mut()[0..2].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_protocol_type(&mut self, v: u16) {
        self.buf.as_mut()[2..4].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_hw_len(&mut self, v: u8) {
        self.buf.as_mut()[4] = v;
    }

    pub fn set_proto_len(&mut self, v: u8) {
        self.buf.as_mut()[5] = v;
    }

    pub fn set_operation(&mut self, op: Operation) {
        self.buf.as_mut()[6..8].copy_from_slice(&op.to_u16().to_be_bytes());
    }

    pub fn set_sender_hw_addr(&mut self, addr: MacAddr) {
        self.buf.as_mut()[8..14].copy_from_slice(&addr.octets());
    }

    pub fn set_sender_proto_addr(&mut self, addr: Ipv4Addr) {
        self.buf.as_mut()[14..18].copy_from_slice(&addr.octets());
    }

    pub fn set_target_hw_addr(&mut self, addr: MacAddr) {
        self.buf.as_mut()[18..24].copy_from_slice(&addr.octets());
    }

    pub fn set_target_proto_addr(&mut self, addr: Ipv4Addr) {
        self.buf.as_mut()[24..28].copy_from_slice(&addr.octets());
    }

    /// Fills in HTYPE/PTYPE/HLEN/PLEN for the Ethernet/IPv4 case this
    /// crate always uses.
    pub fn init_ethernet_ipv4(&mut self, operation: Operation) {
        self.set_hardware_type(HTYPE_ETHERNET);
        self.set_protocol_type(PTYPE_IPV4);
        self.set_hw_len(6);
        self.set_proto_len(4);
        self.set_operation(operation);
    }
}

pub const ETHERNET_IPV4_LEN: usize = MIN_HEADER_LEN + 2 * (6 + 4);
