//! Error taxonomy shared by every layer of the stack.
//!
//! The teacher crate (`rips`) split errors into a `TxError` and a
//! `RxError`, one plain enum per data-path direction. This crate has one
//! more direction to account for (state-machine failures that outlive a
//! single packet), so the split collapses into a single enum covering
//! every kind named by the error design in the parsing, composing and
//! connection layers alike.

use core::fmt;

/// Every error kind produced anywhere in this crate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Supplied span smaller than the required header or payload.
    ShortBuffer,
    /// Computed checksum was non-zero after including the stored field.
    BadCrc,
    /// Non-fatal drop-and-continue signal surfaced by link/IP layers.
    PacketDrop,
    /// Attempt to register a colliding `(protocol, local_port)` pair.
    Duplicate,
    /// Requested result not yet produced.
    NotReady,
    /// Deadline or RTO exhaustion.
    Timeout,
    /// Peer sent RST.
    ConnectionReset,
    /// User called `abort`.
    Aborted,
    /// Parser found a malformed enumerated field.
    InvalidField,
    /// Operation attempted before `configure` was called.
    NotConfigured,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::ShortBuffer => "buffer too short for header",
            Error::BadCrc => "checksum mismatch",
            Error::PacketDrop => "packet dropped",
            Error::Duplicate => "duplicate registration",
            Error::NotReady => "result not ready",
            Error::Timeout => "operation timed out",
            Error::ConnectionReset => "connection reset by peer",
            Error::Aborted => "aborted by caller",
            Error::InvalidField => "invalid field in packet",
            Error::NotConfigured => "node not configured",
        };
        f.write_str(msg)
    }
}

/// Type binding used by every fallible operation in this crate.
pub type Result<T> = core::result::Result<T, Error>;
