//! TCP header view (RFC 9293) with the option subset spec.md requires:
//! MSS, SACK-permitted and NOP recognized on receive, only MSS ever
//! emitted (spec.md §6).

use crate::crc::Crc791;
use crate::error::{Error, Result};

pub const MIN_HEADER_LEN: usize = 20;

pub const FLAG_FIN: u8 = 0b0000_0001;
pub const FLAG_SYN: u8 = 0b0000_0010;
pub const FLAG_RST: u8 = 0b0000_0100;
pub const FLAG_PSH: u8 = 0b0000_1000;
pub const FLAG_ACK: u8 = 0b0001_0000;
pub const FLAG_URG: u8 = 0b0010_0000;

const OPT_END: u8 = 0;
const OPT_NOP: u8 = 1;
const OPT_MSS: u8 = 2;
const OPT_SACK_PERMITTED: u8 = 4;

pub struct TcpPacket<T: AsRef<[u8]>> {
    buf: T,
}

impl<T: AsRef<[u8]>> TcpPacket<T> {
    pub fn new(buf: T) -> Result<Self> {
        if buf.as_ref().len() < MIN_HEADER_LEN {
            return Err(Error::ShortBuffer);
        }
        Ok(TcpPacket { buf })
    }

    pub fn source_port(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[0..2].try_into().unwrap())
    }

    pub fn destination_port(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[2..4].try_into().unwrap())
    }

    pub fn sequence(&self) -> u32 {
        u32::from_be_bytes(self.buf.as_ref()[4..8].try_into().unwrap())
    }

    pub fn ack_number(&self) -> u32 {
        u32::from_be_bytes(self.buf.as_ref()[8..12].try_into().unwrap())
    }

    pub fn data_offset(&self) -> usize {
        ((self.buf.as_ref()[12] >> 4) as usize) * 4
    }

    pub fn flags(&self) -> u8 {
        self.buf.as_ref()[13]
    }

    pub fn window(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[14..16].try_into().unwrap())
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[16..18].try_into().unwrap())
    }

    pub fn urgent_pointer(&self) -> u16 {
        u16::from_be_bytes(self.buf.as_ref()[18..20].try_into().unwrap())
    }

    /// `data_offset()` clamped into `[MIN_HEADER_LEN, buf.len()]` so a
    /// malformed header (offset field not yet written, or declaring more
    /// header than the span holds) can't panic `options`/`payload`;
    /// `validate_size` is what flags those as defects.
    fn clamped_data_offset(&self) -> usize {
        self.data_offset()
            .max(MIN_HEADER_LEN)
            .min(self.buf.as_ref().len())
    }

    pub fn options(&self) -> &[u8] {
        &self.buf.as_ref()[MIN_HEADER_LEN..self.clamped_data_offset()]
    }

    /// Parses the MSS option out of the option bytes, if present. NOP and
    /// SACK-permitted are recognized (skipped) but not surfaced as this
    /// crate never acts on SACK.
    pub fn mss_option(&self) -> Option<u16> {
        let mut opts = self.options();
        while !opts.is_empty() {
            match opts[0] {
                OPT_END => break,
                OPT_NOP => opts = &opts[1..],
                OPT_MSS if opts.len() >= 4 && opts[1] == 4 => {
                    return Some(u16::from_be_bytes([opts[2], opts[3]]));
                }
                OPT_SACK_PERMITTED if opts.len() >= 2 && opts[1] == 2 => {
                    opts = &opts[2..];
                }
                _ if opts.len() >= 2 && opts[1] >= 2 => {
                    let len = opts[1] as usize;
                    if len > opts.len() {
                        break;
                    }
                    opts = &opts[len..];
                }
                _ => break,
            }
        }
        None
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf.as_ref()[self.clamped_data_offset()..]
    }

    pub fn checksum_sum16(&self, pseudo: &Crc791) -> u16 {
        pseudo.payload_sum16(self.buf.as_ref())
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> TcpPacket<T> {
    pub fn set_source_port(&mut self, v: u16) {
        self.buf.as_mut()[0..2].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_destination_port(&mut self, v: u16) {
        self.buf.as_mut()[2..4].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_sequence(&mut self, v: u32) {
        self.buf.as_mut()[4..8].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_ack_number(&mut self, v: u32) {
        self.buf.as_mut()[8..12].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_data_offset(&mut self, header_len_bytes: usize) {
        self.buf.as_mut()[12] = ((header_len_bytes / 4) as u8) << 4;
    }

    pub fn set_flags(&mut self, v: u8) {
        self.buf.as_mut()[13] = v;
    }

    pub fn set_window(&mut self, v: u16) {
        self.buf.as_mut()[14..16].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_checksum(&mut self, v: u16) {
        self.buf.as_mut()[16..18].copy_from_slice(&v.to_be_bytes());
    }

    pub fn set_urgent_pointer(&mut self, v: u16) {
        self.buf.as_mut()[18..20].copy_from_slice(&v.to_be_bytes());
    }

    /// Writes a 4-byte MSS option (kind=2,len=4,value) right after the
    /// fixed header and sets the data offset to cover it. Only option
    /// this crate ever emits (spec.md §6).
    pub fn set_mss_option(&mut self, mss: u16) {
        let opts = &mut self.buf.as_mut()[MIN_HEADER_LEN..MIN_HEADER_LEN + 4];
        opts[0] = OPT_MSS;
        opts[1] = 4;
        opts[2..4].copy_from_slice(&mss.to_be_bytes());
        self.set_data_offset(MIN_HEADER_LEN + 4);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let offset = self.data_offset();
        &mut self.buf.as_mut()[offset..]
    }

    pub fn fill_checksum(&mut self, pseudo: &Crc791) {
        self.set_checksum(0);
        let sum = pseudo.payload_sum16(self.buf.as_ref());
        self.set_checksum(sum);
    }
}
