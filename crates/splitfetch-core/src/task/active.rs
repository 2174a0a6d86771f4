//! State of the task currently being fetched.

use super::{TaskContext, TaskEntry};
use crate::checkpoint::{sidecar_path, spawn_ticker, CheckpointFile};
use crate::fetch_head;
use crate::ledger::{RangeLedger, UNKNOWN_END};
use crate::resolver::{resolve_with_retry, ResolvedLocator};
use crate::storage::StorageWriter;
use crate::url_model::derive_filename;
use crate::wire::RequestTemplate;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Locator in use plus the request template built from it. `generation`
/// increments on every re-resolution.
struct LocatorState {
    locator: ResolvedLocator,
    template: Arc<RequestTemplate>,
    generation: u64,
}

/// An initialized resource task: output file, sidecar, ledger, locator.
pub struct ActiveTask {
    name: String,
    descriptor: String,
    path: PathBuf,
    ctx: Arc<TaskContext>,
    locator: RwLock<LocatorState>,
    /// Serializes re-resolution so one expiry triggers one refresh.
    refresh: Mutex<()>,
    output: StorageWriter,
    ledger: RangeLedger,
    checkpoint: Mutex<Option<CheckpointFile>>,
    completed: AtomicBool,
}

impl ActiveTask {
    /// Resolve the descriptor, open sidecar then output, recover or seed the
    /// ledger, write the first checkpoint, and start the checkpoint ticker.
    ///
    /// `Ok(None)` when the resolved destination already exists without a
    /// sidecar, i.e. an earlier run finished it under the locator's name.
    pub fn initialize(entry: &TaskEntry, ctx: &Arc<TaskContext>) -> Result<Option<Arc<Self>>> {
        let cfg = &ctx.config;
        let locator = resolve_with_retry(ctx.resolver.as_ref(), &entry.descriptor, &ctx.retry)?;
        tracing::info!(descriptor = %entry.descriptor, locator = %locator.url, "resolved");

        let name = match &entry.name {
            Some(explicit) => derive_filename(&locator.url, Some(explicit)),
            None => {
                let from_locator = derive_filename(&locator.url, None);
                let provisional = entry.provisional_name();
                if from_locator != provisional {
                    tracing::info!("filename mismatch {} => {}", provisional, from_locator);
                }
                from_locator
            }
        };
        let path = ctx.output_dir.join(&name);
        if path.exists() && !sidecar_path(&path).exists() {
            tracing::info!(path = %path.display(), "already downloaded, skipping");
            return Ok(None);
        }

        let sidecar = CheckpointFile::open(&sidecar_path(&path))?;
        let output = StorageWriter::open_or_create(&path)?;
        let spans = sidecar.read_spans()?;
        let ledger = if spans.is_empty() {
            let length = if cfg.probe_length {
                fetch_head::probe_length(&locator, &cfg.user_agent, cfg.connect_timeout())
            } else {
                None
            };
            let on_disk = output.len().context("stat output file")?;
            if let Some(len) = length {
                if on_disk != 0 && on_disk != len {
                    tracing::warn!(
                        path = %path.display(),
                        "output is {} bytes but resource is {}; starting over",
                        on_disk,
                        len
                    );
                }
                output
                    .preallocate(len)
                    .with_context(|| format!("pre-size {}", path.display()))?;
            }
            tracing::info!(task = %name, length = ?length, "starting fresh");
            RangeLedger::seed(length, cfg.split_granularity)
        } else {
            let length = recovered_length(&spans, output.len().context("stat output file")?);
            tracing::info!(
                task = %name,
                ranges = spans.len(),
                length = ?length,
                "resuming from sidecar"
            );
            RangeLedger::new(spans, length, cfg.split_granularity)
        };

        let template = RequestTemplate::new(
            &locator,
            &cfg.user_agent,
            cfg.referer.as_deref(),
            &cfg.proxy_headers,
        )?;
        sidecar.rewrite(&ledger.snapshot().spans)?;

        let task = Arc::new(Self {
            name,
            descriptor: entry.descriptor.clone(),
            path,
            ctx: Arc::clone(ctx),
            locator: RwLock::new(LocatorState {
                locator,
                template: Arc::new(template),
                generation: 0,
            }),
            refresh: Mutex::new(()),
            output,
            ledger,
            checkpoint: Mutex::new(Some(sidecar)),
            completed: AtomicBool::new(false),
        });
        spawn_ticker(
            Arc::clone(&task),
            cfg.checkpoint_interval(),
            ctx.status_tx.clone(),
        )?;
        Ok(Some(task))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ledger(&self) -> &RangeLedger {
        &self.ledger
    }

    pub fn output(&self) -> &StorageWriter {
        &self.output
    }

    /// Current request template and the locator generation it belongs to.
    pub fn template(&self) -> (Arc<RequestTemplate>, u64) {
        let st = self.locator.read().unwrap_or_else(PoisonError::into_inner);
        (Arc::clone(&st.template), st.generation)
    }

    pub fn locator(&self) -> ResolvedLocator {
        let st = self.locator.read().unwrap_or_else(PoisonError::into_inner);
        st.locator.clone()
    }

    /// Re-resolve after a link expiry observed on locator `seen`. Workers that
    /// saw the same expiry wait here and then reuse the fresh locator.
    pub fn refresh_locator(&self, seen: u64) -> Result<()> {
        let _guard = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        if self.template().1 != seen {
            return Ok(());
        }
        let cfg = &self.ctx.config;
        let locator =
            resolve_with_retry(self.ctx.resolver.as_ref(), &self.descriptor, &self.ctx.retry)?;
        let template = RequestTemplate::new(
            &locator,
            &cfg.user_agent,
            cfg.referer.as_deref(),
            &cfg.proxy_headers,
        )?;
        tracing::info!(task = %self.name, locator = %locator.url, "locator refreshed");
        let mut st = self.locator.write().unwrap_or_else(PoisonError::into_inner);
        *st = LocatorState {
            locator,
            template: Arc::new(template),
            generation: seen + 1,
        };
        Ok(())
    }

    /// Rewrite the sidecar. A no-op once the task is complete.
    pub fn write_checkpoint(&self, spans: &[(u64, u64)]) -> Result<()> {
        let guard = self.checkpoint.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(cp) => cp.rewrite(spans),
            None => Ok(()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Tear down: flush the output and delete the sidecar. Only the first
    /// call does anything; returns whether this call did.
    pub fn complete(&self) -> Result<bool> {
        if self.completed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let sidecar = self
            .checkpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.output
            .sync()
            .with_context(|| format!("sync {}", self.path.display()))?;
        if let Some(cp) = sidecar {
            cp.remove()?;
        }
        tracing::info!(task = %self.name, "task complete");
        Ok(true)
    }
}

/// Resource length implied by a recovered sidecar and the output's size.
/// Unknown when a span is still unbounded or the file is shorter than the
/// spans claim.
fn recovered_length(spans: &[(u64, u64)], on_disk: u64) -> Option<u64> {
    let max_end = spans.iter().map(|(_, end)| *end).max()?;
    if max_end == UNKNOWN_END || on_disk < max_end {
        return None;
    }
    Some(on_disk)
}
