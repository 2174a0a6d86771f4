//! Periodic checkpoint: persist pending ranges, derive throughput, tear down
//! the task once nothing is left.

use super::status::StatusSnapshot;
use crate::task::ActiveTask;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Result of one checkpoint tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Ranges remain; the sidecar now reflects them.
    Progress(StatusSnapshot),
    /// The ledger was empty and the task has been torn down.
    Complete,
}

/// Checkpoint state for one active task.
pub struct Ticker {
    task: Arc<ActiveTask>,
    last: Option<(u64, Instant)>,
    status_tx: Option<mpsc::Sender<StatusSnapshot>>,
}

impl Ticker {
    pub fn new(task: Arc<ActiveTask>, status_tx: Option<mpsc::Sender<StatusSnapshot>>) -> Self {
        Self {
            task,
            last: None,
            status_tx,
        }
    }

    /// Snapshot the ledger, rewrite the sidecar, and publish a status line.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let snap = self.task.ledger().snapshot();
        if snap.spans.is_empty() {
            self.task.complete()?;
            return Ok(TickOutcome::Complete);
        }
        self.task.write_checkpoint(&snap.spans)?;

        let now = Instant::now();
        let mut bytes_per_sec = 0;
        if let Some((prev, at)) = self.last {
            let secs = now.duration_since(at).as_secs_f64();
            if prev >= snap.remaining && secs > 0.0 {
                bytes_per_sec = ((prev - snap.remaining) as f64 / secs) as u64;
            }
        }
        // Throughput is meaningless until the length bounds the ranges.
        self.last = snap.length.map(|_| (snap.remaining, now));

        let status = StatusSnapshot {
            name: self.task.name().to_string(),
            done: snap
                .length
                .map(|len| len.saturating_sub(snap.remaining))
                .unwrap_or(0),
            total: snap.length,
            remaining: snap.remaining,
            bytes_per_sec,
            active: snap.receiving,
        };
        tracing::debug!(task = %status.name, "{}", status);
        if let Some(tx) = &self.status_tx {
            let _ = tx.try_send(status.clone());
        }
        Ok(TickOutcome::Progress(status))
    }
}

/// Run a [`Ticker`] on its own thread every `interval` until the task completes.
pub fn spawn_ticker(
    task: Arc<ActiveTask>,
    interval: Duration,
    status_tx: Option<mpsc::Sender<StatusSnapshot>>,
) -> Result<JoinHandle<()>> {
    let name = format!("checkpoint-{}", task.name());
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            let mut ticker = Ticker::new(task, status_tx);
            loop {
                thread::sleep(interval);
                if ticker.task.is_complete() {
                    break;
                }
                match ticker.tick() {
                    Ok(TickOutcome::Complete) => break,
                    Ok(TickOutcome::Progress(_)) => {}
                    Err(e) => tracing::warn!(task = %ticker.task.name(), "checkpoint failed: {:#}", e),
                }
            }
        })
        .context("spawn checkpoint thread")
}
