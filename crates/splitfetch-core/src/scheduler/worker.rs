//! One persistent lease loop per upstream path.

use super::slot::TaskSlot;
use crate::ledger::{Lease, Outcome, Range, Release};
use crate::retry::{Cooldowns, ErrorKind};
use crate::task::{ActiveTask, ResourceTask, TaskContext};
use crate::transfer::{run_lease, BodyCopier, Timeouts, TransferError};
use crate::upstream::Upstream;
use std::sync::Arc;
use std::thread;

/// Totals for one worker over the life of the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub upstream: String,
    pub bytes: u64,
    pub leases: u64,
    pub failures: u64,
}

pub struct Worker {
    upstream: Upstream,
    slot: Arc<TaskSlot>,
    ctx: Arc<TaskContext>,
    copier: Arc<dyn BodyCopier>,
    cooldowns: Cooldowns,
    timeouts: Timeouts,
}

impl Worker {
    pub fn new(
        upstream: Upstream,
        slot: Arc<TaskSlot>,
        ctx: Arc<TaskContext>,
        copier: Arc<dyn BodyCopier>,
    ) -> Self {
        let cooldowns = Cooldowns::from(&ctx.config);
        let timeouts = Timeouts {
            connect: ctx.config.connect_timeout(),
            stall: ctx.config.stall_timeout(),
        };
        Self {
            upstream,
            slot,
            ctx,
            copier,
            cooldowns,
            timeouts,
        }
    }

    /// Lease, transfer, release until no task is current.
    pub fn run(self) -> WorkerSummary {
        let span = tracing::info_span!("worker", upstream = %self.upstream);
        let _enter = span.enter();
        let mut summary = WorkerSummary {
            upstream: self.upstream.to_string(),
            ..WorkerSummary::default()
        };
        tracing::debug!("worker started");

        while let Some(resource) = self.slot.current() {
            let Some(task) = resource.ensure_initialized(&self.ctx) else {
                self.slot.advance(&resource);
                continue;
            };
            let range = match task.ledger().lease() {
                Lease::Granted(r) => r,
                Lease::Busy => {
                    thread::sleep(self.cooldowns.idle);
                    continue;
                }
                Lease::Exhausted => {
                    self.finish(&task, &resource);
                    continue;
                }
            };
            summary.leases += 1;
            tracing::debug!(range = %range, "leased");

            let (template, generation) = task.template();
            let result = run_lease(
                &self.upstream,
                &template,
                &range,
                task.ledger(),
                task.output(),
                self.copier.as_ref(),
                self.timeouts,
            );
            let failure = match result {
                Ok(n) => {
                    summary.bytes += n;
                    None
                }
                Err(e) => {
                    summary.failures += 1;
                    Some(self.on_failure(&task, generation, &range, e))
                }
            };

            if let Some(hold) = failure.and_then(|k| self.cooldowns.hold_before_release(k)) {
                thread::sleep(hold);
            }
            let outcome = match failure {
                None => Outcome::Completed,
                Some(_) => Outcome::Failed,
            };
            if task.ledger().release(&range, outcome) == Release::TaskComplete {
                self.finish(&task, &resource);
            }
            if let Some(pause) = self.cooldowns.after_release(failure) {
                thread::sleep(pause);
            }
        }

        tracing::debug!(bytes = summary.bytes, "worker stopped");
        summary
    }

    fn on_failure(
        &self,
        task: &ActiveTask,
        generation: u64,
        range: &Range,
        e: TransferError,
    ) -> ErrorKind {
        let kind = e.kind();
        tracing::warn!(cur = range.cur(), end = range.end(), kind = %kind, error = %e, "transfer failed");
        if kind == ErrorKind::LinkExpiry {
            if let Err(e) = task.refresh_locator(generation) {
                tracing::warn!(descriptor = %task.descriptor(), "re-resolution failed: {:#}", e);
            }
        }
        kind
    }

    fn finish(&self, task: &ActiveTask, resource: &Arc<ResourceTask>) {
        if let Err(e) = task.complete() {
            tracing::warn!(task = %task.name(), "teardown failed: {:#}", e);
        }
        self.slot.advance(resource);
    }
}
