//! UDP header view (RFC 768), including the zero-checksum-means-0xFFFF
//! wire convention.

use crate::crc::{never_zero_sum, Crc791};
use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 8;

pub struct UdpPacket<T: AsRef<[u8]>> {
    buf: T,
}

impl<T: AsRef<[u8]>> UdpPacket<T> {
    pub fn new(buf: T) -> Result<Self> {
        if buf.as_ref().len() < HEADER_LEN {
            return Err(Error::ShortBuffer);
        }
        Ok(UdpPacket { buf })
    }

    pub fn source_port(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[0..2].try_into().unwrap())
    }

    pub fn destination_port(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[2..4].try_into().unwrap())
    }

    pub fn length(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[4..6].try_into().unwrap())
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[6..8].try_into().unwrap())
    }

    pub fn payload(&self) -> &[u8] {
        let end = (self.length() as usize).max(HEADER_LEN).min(self.buf.as_ref().len());
        &self.buf.as_ref()[HEADER_LEN..end]
    }

    /// Checksum over the datagram given an accumulator already primed
    /// with the IP pseudo-header (`crc_write_udp_pseudo`). Zero means
    /// valid, per the RFC 1071 invariant, once the 0x0000/0xFFFF
    /// convention is unwound.
    pub fn checksum_sum16(&self, pseudo: &Crc791) -> u16 {
        let sum = pseudo.payload_sum16(&self.buf.as_ref()[..self.length() as usize]);
        if self.checksum() == 0 {
            0
        } else {
            sum
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> UdpPacket<T> {
    pub fn set_source_port(&mut self, v: u16) {
        self.buf.as_mut()[0..2].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_destination_port(&mut self, v: u16) {
        self.buf.as_mut()[2..4].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_length(&mut self, v: u16) {
        self.buf.as_mut()[4..6].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_checksum(&mut self, v: u16) {
        self.buf.as_mut()[6..8].copy_from_slice(&v.to_be_bytes());
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf.as_mut()[HEADER_LEN..]
    }

    /// Finalizes the checksum given a pseudo-header-primed accumulator,
    /// applying the RFC 768 zero-remap.
    pub fn fill_checksum(&mut self, pseudo: &Crc791) {
        self.set_checksum(0);
        let len = self.length() as usize;
        let sum = pseudo.payload_sum16(&self.buf.as_ref()[..len]);
        self.set_checksum(never_zero_sum(sum));
    }
}
