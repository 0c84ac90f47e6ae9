//! Tx packet queue (spec.md §3.2): a fixed-capacity, ascending-seq list
//! of segments already delivered to the IP layer but not yet fully
//! acknowledged, each tracked for retransmission.

use heapless::Vec;

use crate::time::Instant;
use crate::tcp::seq::{self, Size, Value};

/// One outstanding (unacked) segment.
#[derive(Copy, Clone, Debug)]
pub struct Slot {
    pub seq: Value,
    pub len: Size,
    pub flags: u8,
    pub deadline: Instant,
    pub retransmits: u8,
}

impl Slot {
    pub fn end_seq(&self) -> Value {
        self.seq.wrapping_add(self.len)
    }
}

/// Bounded, ascending-sequence FIFO of in-flight segments, capacity `K`
/// fixed at construction (spec.md §6, `tx_packet_queue_size`).
pub struct TxPacketQueue<const K: usize> {
    slots: Vec<Slot, K>,
}

impl<const K: usize> TxPacketQueue<K> {
    pub fn new() -> TxPacketQueue<K> {
        TxPacketQueue { slots: Vec::new() }
    }

    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Appends a newly sent segment. Caller guarantees ascending seq
    /// order (spec.md §3.2 invariant); debug-asserted, not re-checked at
    /// runtime on the hot path.
    pub fn push(&mut self, slot: Slot) -> bool {
        debug_assert!(self
            .slots
            .last()
            .map_or(true, |last| seq::le(last.end_seq(), slot.seq)));
        self.slots.push(slot).is_ok()
    }

    /// Releases every slot whose end sequence is now `<= snd_una`,
    /// returning the cumulative byte length released (used to advance
    /// the tx ring's read cursor by the same amount).
    pub fn release_acked(&mut self, snd_una: Value) -> Size {
        let mut released = 0;
        while let Some(first) = self.slots.first() {
            if seq::le(first.end_seq(), snd_una) {
                released += first.len;
                self.slots.remove(0);
            } else {
                break;
            }
        }
        released
    }

    /// The oldest slot whose deadline has elapsed, if any, by reference
    /// so the caller can re-emit it and then call `mark_retransmitted`.
    pub fn due_for_retransmit(&self, now: Instant) -> Option<usize> {
        self.slots.first().and_then(|s| if now >= s.deadline { Some(0) } else { None })
    }

    pub fn get(&self, idx: usize) -> Option<&Slot> {
        self.slots.get(idx)
    }

    /// Reschedules slot `idx` with a backed-off deadline, incrementing
    /// its retransmit counter. Returns the new retransmit count.
    pub fn mark_retransmitted(&mut self, idx: usize, new_deadline: Instant) -> u8 {
        let slot = &mut self.slots[idx];
        slot.retransmits += 1;
        slot.deadline = new_deadline;
        slot.retransmits
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl<const K: usize> Default for TxPacketQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
