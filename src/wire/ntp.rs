//! NTP v3/v4 48-byte header (RFC 5905), four-timestamp exchange.

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 48;

/// NTP era-0 epoch: 1900-01-01T00:00:00Z, expressed as seconds since the
/// Unix epoch this crate's clock injection otherwise assumes.
pub const ERA0_UNIX_OFFSET_SECS: i64 = -2_208_988_800;

pub const MODE_CLIENT: u8 = 3;
pub const MODE_SERVER: u8 = 4;

/// A 64-bit NTP short/long timestamp: 32.32 fixed point seconds.fraction
/// since the NTP era-0 epoch.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct Timestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        seconds: 0,
        fraction: 0,
    };

    fn from_bytes(b: &[u8]) -> Timestamp {
        Timestamp {
            seconds: u32::from_be_bytes(b[0..4].try_into().unwrap()),
            fraction: u32::from_be_bytes(b[4..8].try_into().unwrap()),
        }
    }

    fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0..4].copy_from_slice(&self.seconds.to_be_bytes());
        out[4..8].copy_from_slice(&self.fraction.to_be_bytes());
        out
    }

    /// Converts to a microsecond count since era-0, for offset arithmetic.
    pub fn as_micros(&self) -> u64 {
        let frac_micros = ((self.fraction as u64) * 1_000_000) >> 32;
        (self.seconds as u64) * 1_000_000 + frac_micros
    }

    pub fn from_micros(micros: u64) -> Timestamp {
        let seconds = (micros / 1_000_000) as u32;
        let rem_micros = micros % 1_000_000;
        let fraction = ((rem_micros << 32) / 1_000_000) as u32;
        Timestamp { seconds, fraction }
    }
}

pub struct NtpPacket<T: AsRef<[u8]>> {
    buf: T,
}

impl<T: AsRef<[u8]>> NtpPacket<T> {
    pub fn new(buf: T) -> Result<Self> {
        if buf.as_ref().len() < HEADER_LEN {
            return Err(Error::ShortBuffer);
        }
        Ok(NtpPacket { buf })
    }

    pub fn leap_indicator(&self) -> u8 {
        self.buf.as_ref()[0] >> 6
    }

    pub fn version(&self) -> u8 {
        (self.buf.as_ref()[0] >> 3) & 0x07
    }

    pub fn mode(&self) -> u8 {
        self.buf.as_ref()[0] & 0x07
    }

    pub fn stratum(&self) -> u8 {
        self.buf.as_ref()[1]
    }

    /// Originate timestamp (T1): client's transmit time echoed back.
    pub fn originate_timestamp(&self) -> Timestamp {
        Timestamp::from_bytes(&self.buf.as_ref()[24..32])
    }

    /// Receive timestamp (T2): server's receipt time.
    pub fn receive_timestamp(&self) -> Timestamp {
        Timestamp::from_bytes(&self.buf.as_ref()[32..40])
    }

    /// Transmit timestamp (T3): server's reply time.
    pub fn transmit_timestamp(&self) -> Timestamp {
        Timestamp::from_bytes(&self.buf.as_ref()[40..48])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> NtpPacket<T> {
    pub fn set_leap_version_mode(&mut self, leap: u8, version: u8, mode: u8) {
        self.buf.as_mut()[0] = (leap << 6) | (version << 3) | mode;
    }

    pub fn set_transmit_timestamp(&mut self, ts: Timestamp) {
        self.buf.as_mut()[40..48].copy_from_slice(&ts.to_bytes());
    }

    pub fn set_originate_timestamp(&mut self, ts: Timestamp) {
        self.buf.as_mut()[24..32].copy_from_slice(&ts.to_bytes());
    }

    pub fn set_receive_timestamp(&mut self, ts: Timestamp) {
        self.buf.as_mut()[32..40].copy_from_slice(&ts.to_bytes());
    }
}

/// Computes the clock offset and round-trip delay from the four
/// timestamps of one NTP exchange (RFC 5905 §8):
/// `T1` = client transmit, `T2` = server receive, `T3` = server transmit,
/// `T4` = client receive.
pub fn compute_offset(t1: Timestamp, t2: Timestamp, t3: Timestamp, t4: Timestamp) -> (i64, i64) {
    let t1 = t1.as_micros() as i64;
    let t2 = t2.as_micros() as i64;
    let t3 = t3.as_micros() as i64;
    let t4 = t4.as_micros() as i64;
    let offset = ((t2 - t1) + (t3 - t4)) / 2;
    let delay = (t4 - t1) - (t3 - t2);
    (offset, delay)
}
