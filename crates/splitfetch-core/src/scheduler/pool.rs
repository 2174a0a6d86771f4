use super::slot::TaskSlot;
use super::worker::{Worker, WorkerSummary};
use crate::task::TaskContext;
use crate::transfer::BodyCopier;
use crate::upstream::Upstream;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread;

/// What the pool did before the queue ran dry.
#[derive(Debug, Clone, Default)]
pub struct PoolSummary {
    pub workers: Vec<WorkerSummary>,
}

impl PoolSummary {
    pub fn total_bytes(&self) -> u64 {
        self.workers.iter().map(|w| w.bytes).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.workers.iter().map(|w| w.failures).sum()
    }
}

/// Spawn one worker thread per upstream and wait for all of them.
/// Blocks the calling thread; run it from `spawn_blocking` in async code.
pub fn run_pool(
    upstreams: Vec<Upstream>,
    slot: Arc<TaskSlot>,
    ctx: Arc<TaskContext>,
    copier: Arc<dyn BodyCopier>,
) -> Result<PoolSummary> {
    if upstreams.is_empty() {
        anyhow::bail!("no upstream paths configured");
    }
    tracing::info!(workers = upstreams.len(), copier = copier.name(), "starting worker pool");

    let mut handles = Vec::with_capacity(upstreams.len());
    for upstream in upstreams {
        let name = format!("worker-{}", upstream);
        let worker = Worker::new(upstream, Arc::clone(&slot), Arc::clone(&ctx), Arc::clone(&copier));
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run())
            .context("spawn worker thread")?;
        handles.push(handle);
    }

    let mut summary = PoolSummary::default();
    for handle in handles {
        match handle.join() {
            Ok(w) => summary.workers.push(w),
            Err(_) => tracing::error!("worker thread panicked"),
        }
    }
    tracing::info!(
        bytes = summary.total_bytes(),
        failures = summary.total_failures(),
        "worker pool finished"
    );
    Ok(summary)
}
