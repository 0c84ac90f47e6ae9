//! Scratch validation-error collector threaded through header parsing.
//!
//! The teacher never needed this (its `*Rx::recv` returns on the first
//! problem), but spec.md §3.1 calls for a `Validator` that can collect
//! multiple header defects per call when a caller wants that (e.g. a
//! diagnostic tool reporting every problem with a frame, not just the
//! first). Capacity is fixed (no allocation) and mirrors the bounded
//! tables used elsewhere in this crate (ARP's pending-query/pending-reply
//! tables, the TCP retransmit queue).

use heapless::Vec;

use crate::error::Error;

/// How many distinct defects one `validate_size` pass will record before
/// further ones are silently dropped (the `has_error` invariant still
/// holds; only the *count* is capped).
pub const MAX_ERRORS: usize = 8;

/// Whether a validation pass should stop recording after the first error
/// kind it encounters or keep collecting up to `MAX_ERRORS`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ValidationFlags {
    StopOnFirst,
    CollectAll,
}

/// Collects header-validation defects across one call chain.
pub struct Validator {
    flags: ValidationFlags,
    errors: Vec<Error, MAX_ERRORS>,
}

impl Validator {
    pub fn new(flags: ValidationFlags) -> Validator {
        Validator {
            flags,
            errors: Vec::new(),
        }
    }

    /// Records a defect. Returns `true` if the caller should stop further
    /// validation (either because we are in `StopOnFirst` mode, or the
    /// scratch list is full).
    pub fn err_push(&mut self, kind: Error) -> bool {
        let _ = self.errors.push(kind);
        self.flags == ValidationFlags::StopOnFirst || self.errors.is_full()
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Drains and returns the first recorded error, if any, clearing
    /// nothing else about the validator's state (it remains usable).
    pub fn err_pop(&mut self) -> Option<Error> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.remove(0))
        }
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }
}
