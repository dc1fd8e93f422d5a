//! Monotonic sequences.
//!
//! Sequences are `u64` values where [`NIL_SEQUENCE`] (`u64::MAX`) means "nothing
//! yet" and orders before every real sequence. Incrementing NIL wraps to `0`, so
//! the first value handed out by a fresh [`SequenceGenerator`] is `0`.

use crate::error::{ChronicleError, ChronicleResult};

/// Sentinel for "no sequence assigned yet".
pub const NIL_SEQUENCE: u64 = u64::MAX;

/// Position of a sequence in NIL-first order (NIL -> 0, 0 -> 1, ...).
#[inline]
pub fn ordinal(sequence: u64) -> u64 {
    sequence.wrapping_add(1)
}

/// The sequence immediately after `sequence` (NIL -> 0).
#[inline]
pub fn successor(sequence: u64) -> u64 {
    sequence.wrapping_add(1)
}

/// True when `a` comes strictly after `b` in NIL-first order.
#[inline]
pub fn is_after(a: u64, b: u64) -> bool {
    ordinal(a) > ordinal(b)
}

/// True when `a` equals `b` or comes before it in NIL-first order.
#[inline]
pub fn is_at_or_before(a: u64, b: u64) -> bool {
    !is_after(a, b)
}

/// Per-source monotonic counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceGenerator {
    current: u64,
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self {
            current: NIL_SEQUENCE,
        }
    }

    /// Generator whose next value will be `successor(current)`.
    pub fn starting_after(current: u64) -> Self {
        Self { current }
    }

    /// Last value handed out (or fast-forwarded to); NIL if none.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// The value `next()` would return, without consuming it.
    pub fn peek_next(&self) -> u64 {
        successor(self.current)
    }

    /// Increment and return.
    pub fn next(&mut self) -> u64 {
        let next = successor(self.current);
        debug_assert_ne!(next, NIL_SEQUENCE, "sequence space exhausted");
        self.current = next;
        next
    }

    /// Advance to `sequence`. Only moving forward is legal.
    pub fn fast_forward(&mut self, sequence: u64) -> ChronicleResult<()> {
        if sequence == NIL_SEQUENCE || !is_after(sequence, self.current) {
            return Err(ChronicleError::SequenceRetreat {
                current: self.current,
                requested: sequence,
            });
        }
        self.current = sequence;
        Ok(())
    }
}
