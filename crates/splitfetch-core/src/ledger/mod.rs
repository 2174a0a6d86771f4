//! Range ledger: the pending byte spans of the active task.
//!
//! Workers `lease` a range, stream into it, and `release` it. Leasing prefers
//! abandoned (Idle) work, and otherwise splits the range with the most bytes
//! left in half, never below the split granularity. Releasing drops finished
//! ranges and coalesces adjacent ones so repeated splitting does not grow the
//! ledger without bound. All bookkeeping happens under one short-lived lock;
//! no network or disk I/O is done while it is held.
//!
//! Merge and lookup are linear scans over the range list, which stays small
//! (roughly one range per worker). Each `release` is O(n) in ledger size.

mod range;


pub use range::{Range, RangeState};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default minimum size of either half of a split.
pub const DEFAULT_SPLIT_GRANULARITY: u64 = 64 * 1024;

/// End marker of the seed range while the resource length is unknown.
pub const UNKNOWN_END: u64 = u64::MAX;

/// Result of `RangeLedger::lease`.
#[derive(Debug)]
pub enum Lease {
    /// A range exclusively held by the caller until released.
    Granted(Arc<Range>),
    /// Ranges are pending but none can be handed out now; back off and retry.
    Busy,
    /// The ledger is empty: the task is complete.
    Exhausted,
}

/// How the lease holder's transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

/// Result of `RangeLedger::release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Work remains in the ledger.
    Pending,
    /// This release emptied the ledger.
    TaskComplete,
    /// The range was no longer in the ledger; nothing changed.
    Stale,
}

/// Result of reporting the resource length to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUpdate {
    /// First report: the length is now established and ranges were clamped.
    Adopted,
    /// Matches the established length.
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("reported length {reported} differs from established length {expected}")]
pub struct LengthMismatch {
    pub expected: u64,
    pub reported: u64,
}

/// Point-in-time view used by checkpointing and the status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Pending `(cur, end)` spans with `cur < end`, ordered by `cur`.
    pub spans: Vec<(u64, u64)>,
    /// Sum of pending bytes.
    pub remaining: u64,
    /// Ranges currently streaming body bytes.
    pub receiving: usize,
    pub length: Option<u64>,
}

struct LedgerInner {
    ranges: Vec<Arc<Range>>,
    length: Option<u64>,
}

pub struct RangeLedger {
    inner: Mutex<LedgerInner>,
    granularity: u64,
}

impl RangeLedger {
    /// Ledger holding the given `(cur, end)` spans. Spans with `cur >= end`
    /// are dropped; ends beyond a known `length` are clamped to it.
    pub fn new(
        spans: impl IntoIterator<Item = (u64, u64)>,
        length: Option<u64>,
        granularity: u64,
    ) -> Self {
        let ranges = spans
            .into_iter()
            .map(|(cur, end)| (cur, length.map_or(end, |l| end.min(l))))
            .filter(|(cur, end)| cur < end)
            .map(|(cur, end)| Arc::new(Range::new(cur, end)))
            .collect();
        Self {
            inner: Mutex::new(LedgerInner { ranges, length }),
            granularity: granularity.max(1),
        }
    }

    /// Fresh ledger with a single range over the whole resource, or over
    /// `[0, UNKNOWN_END)` when the length is not known yet.
    pub fn seed(length: Option<u64>, granularity: u64) -> Self {
        Self::new([(0, length.unwrap_or(UNKNOWN_END))], length, granularity)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn length(&self) -> Option<u64> {
        self.lock().length
    }

    /// Number of ranges tracked, including finished ones awaiting release.
    pub fn len(&self) -> usize {
        self.lock().ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().ranges.is_empty()
    }

    /// Hand out the most useful unit of remaining work.
    ///
    /// 1. An Idle range is returned as-is (abandoned work first).
    /// 2. Otherwise the range with the most bytes left is split at the
    ///    midpoint of its remaining span; the caller gets the upper half.
    ///    Splits happen only when both halves are at least the granularity,
    ///    and never while the length is unknown.
    /// 3. Otherwise `Busy`.
    pub fn lease(&self) -> Lease {
        let mut inner = self.lock();
        inner
            .ranges
            .retain(|r| r.state() != RangeState::Idle || !r.is_finished());
        if inner.ranges.is_empty() {
            return Lease::Exhausted;
        }

        if let Some(idle) = inner
            .ranges
            .iter()
            .find(|r| r.state() == RangeState::Idle)
        {
            idle.set_state(RangeState::Leased);
            return Lease::Granted(Arc::clone(idle));
        }

        if inner.length.is_none() {
            return Lease::Busy;
        }

        let largest = match inner.ranges.iter().max_by_key(|r| r.remaining()) {
            Some(r) => Arc::clone(r),
            None => return Lease::Busy,
        };
        let cur = largest.cur();
        let end = largest.end();
        let remaining = end.saturating_sub(cur);
        if remaining / 2 < self.granularity {
            return Lease::Busy;
        }

        let mid = cur + remaining / 2;
        largest.set_end(mid);
        let split = Arc::new(Range::with_state(mid, end, RangeState::Leased));
        inner.ranges.push(Arc::clone(&split));
        tracing::trace!(parent = %largest, child = %split, "split range");
        Lease::Granted(split)
    }

    /// Return a leased range.
    ///
    /// Finished-ness is decided by `cur >= end`, not by `outcome`: a range
    /// whose end grew while it was in flight goes back to Idle. Adjacent
    /// ranges are coalesced:
    /// - a finished range absorbs an Idle neighbour starting at its end;
    /// - an unfinished range whose `cur` equals another range's `end` is
    ///   folded into that range.
    pub fn release(&self, range: &Arc<Range>, outcome: Outcome) -> Release {
        let mut inner = self.lock();
        if !inner.ranges.iter().any(|r| Arc::ptr_eq(r, range)) {
            return Release::Stale;
        }

        if outcome == Outcome::Completed && !range.is_finished() {
            tracing::debug!(range = %range, "range grew while in flight");
        }

        let mut remove_self = false;
        if range.is_finished() {
            let end = range.end();
            let neighbour = inner.ranges.iter().position(|n| {
                !Arc::ptr_eq(n, range) && n.state() == RangeState::Idle && n.cur() == end
            });
            if let Some(npos) = neighbour {
                let n = inner.ranges.remove(npos);
                range.set_end(n.end());
            }
            remove_self = range.is_finished();
        } else {
            let cur = range.cur();
            if let Some(prev) = inner
                .ranges
                .iter()
                .find(|p| !Arc::ptr_eq(p, range) && p.end() == cur)
            {
                prev.set_end(range.end());
                remove_self = true;
            }
        }

        if remove_self {
            if let Some(pos) = inner.ranges.iter().position(|r| Arc::ptr_eq(r, range)) {
                inner.ranges.remove(pos);
            }
        } else {
            range.set_state(RangeState::Idle);
        }

        if inner.ranges.is_empty() {
            Release::TaskComplete
        } else {
            Release::Pending
        }
    }

    /// Report the total length seen in a response. The first report is
    /// adopted and clamps every range to it; later ones must match.
    pub fn set_length(&self, length: u64) -> Result<LengthUpdate, LengthMismatch> {
        let mut inner = self.lock();
        match inner.length {
            Some(expected) if expected != length => Err(LengthMismatch {
                expected,
                reported: length,
            }),
            Some(_) => Ok(LengthUpdate::Confirmed),
            None => {
                inner.length = Some(length);
                for r in &inner.ranges {
                    if r.end() > length {
                        r.set_end(length);
                    }
                }
                inner
                    .ranges
                    .retain(|r| r.state() != RangeState::Idle || !r.is_finished());
                Ok(LengthUpdate::Adopted)
            }
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.lock();
        let mut snap = LedgerSnapshot {
            length: inner.length,
            ..LedgerSnapshot::default()
        };
        for r in &inner.ranges {
            let (cur, end) = (r.cur(), r.end());
            if cur >= end {
                continue;
            }
            snap.spans.push((cur, end));
            snap.remaining += end - cur;
            if r.state() == RangeState::Receiving {
                snap.receiving += 1;
            }
        }
        snap.spans.sort_unstable();
        snap
    }
}
