//! RFC 1071 one's-complement checksum accumulator ("CRC-791", after the
//! IPv4 RFC that specifies it).
//!
//! Ported from the checksum folding the teacher leaned on `pnet` for
//! (`pnet::packet::ipv4::checksum`, `pnet::packet::util::ipv4_checksum`)
//! but written by hand here since `pnet` is dropped (see DESIGN.md) and
//! this crate needs the accumulator exposed as incremental state so the
//! pseudo-header can be folded in before the transport payload.

/// Incremental one's-complement sum accumulator.
///
/// `write` can be called any number of times with slices of any length;
/// an odd trailing byte from one call is carried into the next so that
/// splitting a buffer into pieces (header, pseudo-header, payload) never
/// changes the result versus summing it as one contiguous slice.
#[derive(Copy, Clone, Debug, Default)]
pub struct Crc791 {
    sum: u32,
    carry_byte: Option<u8>,
}

impl Crc791 {
    pub fn new() -> Crc791 {
        Crc791 {
            sum: 0,
            carry_byte: None,
        }
    }

    /// Fold a single big-endian 16-bit word into the accumulator.
    pub fn add_u16(&mut self, word: u16) {
        self.sum += word as u32;
    }

    /// Fold an arbitrary byte slice into the accumulator, network byte
    /// order, carrying an odd trailing byte across calls.
    pub fn write(&mut self, bytes: &[u8]) {
        let mut iter = bytes.iter();
        if let Some(&first) = self.carry_byte.take().as_ref() {
            if let Some(&next) = iter.next() {
                self.add_u16(u16::from_be_bytes([first, next]));
            } else {
                self.carry_byte = Some(first);
                return;
            }
        }
        let mut chunks = iter.as_slice().chunks_exact(2);
        for chunk in &mut chunks {
            self.add_u16(u16::from_be_bytes([chunk[0], chunk[1]]));
        }
        let rem = chunks.remainder();
        if let Some(&b) = rem.first() {
            self.carry_byte = Some(b);
        }
    }

    /// Finish a pass: fold any trailing odd byte (padded with zero, as
    /// RFC 1071 requires), fold the 32-bit carries back in, and return the
    /// one's-complement of the 16-bit result.
    fn finish(mut self) -> u16 {
        if let Some(b) = self.carry_byte.take() {
            self.add_u16(u16::from_be_bytes([b, 0]));
        }
        let mut sum = self.sum;
        while sum >> 16 != 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        !(sum as u16)
    }

    /// Fold `bytes` into a *copy* of this accumulator's state and return the
    /// final 16-bit checksum. Does not mutate `self`, so the same
    /// pseudo-header-primed accumulator can be reused to check several
    /// candidate payloads.
    pub fn payload_sum16(&self, bytes: &[u8]) -> u16 {
        let mut acc = *self;
        acc.write(bytes);
        acc.finish()
    }
}

/// RFC 768: a UDP checksum of exactly zero is indistinguishable from "no
/// checksum computed", so it is remapped to the all-ones value on the
/// wire. Decoders must reverse this before checking.
pub fn never_zero_sum(checksum: u16) -> u16 {
    if checksum == 0 {
        0xFFFF
    } else {
        checksum
    }
}
