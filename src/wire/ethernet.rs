//! Ethernet II framing (RFC 894) with optional 802.1Q VLAN tag.

use crate::addr::MacAddr;
use crate::error::{Error, Result};
use crate::validate::Validator;
use crate::wire::ether_type;

const DST: core::ops::Range<usize> = 0..6;
const SRC: core::ops::Range<usize> = 6..12;
const ETHERTYPE: core::ops::Range<usize> = 12..14;
pub const HEADER_LEN: usize = 14;

const VLAN_TPID: core::ops::Range<usize> = 12..14;
const VLAN_TCI: core::ops::Range<usize> = 14..16;
const VLAN_ETHERTYPE: core::ops::Range<usize> = 16..18;
pub const VLAN_HEADER_LEN: usize = 18;

/// An Ethernet II frame view, optionally carrying an 802.1Q tag.
pub struct EthernetFrame<T: AsRef<[u8]>> {
    buf: T,
}

impl<T: AsRef<[u8]>> EthernetFrame<T> {
    /// Builds a view over `buf`, failing if it is shorter than the fixed
    /// (untagged) Ethernet header.
    pub fn new(buf: T) -> Result<Self> {
        if buf.as_ref().len() < HEADER_LEN {
            return Err(Error::ShortBuffer);
        }
        Ok(EthernetFrame { buf })
    }

    pub fn validate_size(&self, validator: &mut Validator) {
        if self.buf.as_ref().len() < self.header_len() {
            validator.err_push(Error::ShortBuffer);
        }
    }

    pub fn destination(&self) -> MacAddr {
        MacAddr::from_bytes(&self.buf.as_ref()[DST]).expect("checked in new")
    }

    pub fn source(&self) -> MacAddr {
        MacAddr::from_bytes(&self.buf.as_ref()[SRC]).expect("checked in new")
    }

    pub fn has_vlan_tag(&self) -> bool {
        u16::from_be_bytes(self.buf.as_ref()[VLAN_TPID].try_into().unwrap()) == ether_type::VLAN
    }

    /// VLAN tag control information (priority/DEI/VID), if tagged.
    pub fn vlan_tci(&self) -> Option<u16> {
        if self.has_vlan_tag() {
            Some(u16::from_be_bytes(
                self.buf.as_ref()[VLAN_TCI].try_into().unwrap(),
            ))
        } else {
            None
        }
    }

    /// The protocol identifier: the inner EtherType if VLAN-tagged, the
    /// plain EtherType otherwise.
    pub fn ethertype(&self) -> u16 {
        if self.has_vlan_tag() {
            u16::from_be_bytes(self.buf.as_ref()[VLAN_ETHERTYPE].try_into().unwrap())
        } else {
            u16::from_be_bytes(self.buf.as_ref()[ETHERTYPE].try_into().unwrap())
        }
    }

    fn header_len(&self) -> usize {
        if self.has_vlan_tag() {
            VLAN_HEADER_LEN
        } else {
            HEADER_LEN
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf.as_ref()[self.header_len()..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> EthernetFrame<T> {
    /// Builds an untagged header of `header_len()` bytes in `buf`, then
    /// exposes the rest via `payload_mut`. VLAN frames are decoded on
    /// receive but never synthesized (spec.md §4.4.1), so this constructor
    /// always writes the untagged 14-byte form.
    pub fn set_destination(&mut self, addr: MacAddr) {
        self.buf.as_mut()[DST].copy_from_slice(&addr.octets());
    }

    pub fn set_source(&mut self, addr: MacAddr) {
        self.buf.as_mut()[SRC].copy_from_slice(&addr.octets());
    }

    pub fn set_ethertype(&mut self, ethertype: u16) {
        self.buf.as_mut()[ETHERTYPE].copy_from_slice(&ethertype.to_be_bytes());
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf.as_mut()[HEADER_LEN..]
    }
}
