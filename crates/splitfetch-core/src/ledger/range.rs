//! A pending byte span and its lease state.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lease state of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeState {
    /// Not held by any worker; next in line for `lease`.
    Idle,
    /// Handed to a worker that has not yet started receiving the body.
    Leased,
    /// A worker is streaming body bytes into it.
    Receiving,
}

impl RangeState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RangeState::Leased,
            2 => RangeState::Receiving,
            _ => RangeState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RangeState::Idle => 0,
            RangeState::Leased => 1,
            RangeState::Receiving => 2,
        }
    }
}

/// Half-open span `[cur, end)` of bytes not yet written.
///
/// `cur` only moves up and is advanced by the worker holding the lease.
/// `end` is changed by the ledger (split, coalesce, length clamp) under its
/// lock, possibly while a transfer is in flight; transfers re-read it.
#[derive(Debug)]
pub struct Range {
    cur: AtomicU64,
    end: AtomicU64,
    state: AtomicU8,
}

impl Range {
    pub fn new(cur: u64, end: u64) -> Self {
        Self::with_state(cur, end, RangeState::Idle)
    }

    pub(crate) fn with_state(cur: u64, end: u64, state: RangeState) -> Self {
        Self {
            cur: AtomicU64::new(cur),
            end: AtomicU64::new(end),
            state: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn cur(&self) -> u64 {
        self.cur.load(Ordering::Acquire)
    }

    pub fn end(&self) -> u64 {
        self.end.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RangeState {
        RangeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Bytes still pending in this range.
    pub fn remaining(&self) -> u64 {
        self.end().saturating_sub(self.cur())
    }

    pub fn is_finished(&self) -> bool {
        self.cur() >= self.end()
    }

    /// Record `n` bytes durably written at the current position.
    pub fn advance(&self, n: u64) -> u64 {
        self.cur.fetch_add(n, Ordering::AcqRel) + n
    }

    /// The lease holder started streaming body bytes.
    pub fn mark_receiving(&self) {
        self.set_state(RangeState::Receiving);
    }

    pub(crate) fn set_state(&self, state: RangeState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn set_end(&self, end: u64) {
        self.end.store(end, Ordering::Release);
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.cur(), self.end())
    }
}
