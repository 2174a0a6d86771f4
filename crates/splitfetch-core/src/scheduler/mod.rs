//! Worker pool and current-task scheduling.
//!
//! One worker thread runs per upstream path. Workers share a single
//! [`TaskSlot`] holding the current resource task; each lease cycle re-reads
//! it, so advancing to the next descriptor is observed by every worker on its
//! next iteration. The pool returns once the descriptor queue is exhausted
//! and every worker has stopped.

mod pool;
mod slot;
mod worker;

pub use pool::{run_pool, PoolSummary};
pub use slot::TaskSlot;
pub use worker::{Worker, WorkerSummary};
