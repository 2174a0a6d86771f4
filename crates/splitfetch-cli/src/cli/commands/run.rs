//! `splitfetch run` – fetch every queued descriptor over all upstream paths.

use anyhow::{Context, Result};
use splitfetch_core::checkpoint::StatusSnapshot;
use splitfetch_core::config::{FetchConfig, ResolverKind, TransferBackend};
use splitfetch_core::scheduler::{self, TaskSlot};
use splitfetch_core::task::{TaskContext, TaskQueue};
use splitfetch_core::transfer::{copier_for, BodyCopier};
use splitfetch_core::upstream::load_upstreams;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line values that take precedence over config.toml.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub tasks: Option<PathBuf>,
    pub upstreams: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub backend: Option<TransferBackend>,
    pub resolver: Option<ResolverKind>,
}

impl RunOverrides {
    pub fn apply(self, mut cfg: FetchConfig) -> FetchConfig {
        if let Some(tasks) = self.tasks {
            cfg.tasks_file = tasks;
        }
        if let Some(upstreams) = self.upstreams {
            cfg.upstreams_file = upstreams;
        }
        if let Some(dir) = self.dir {
            cfg.download_dir = Some(dir);
        }
        if let Some(backend) = self.backend {
            cfg.transfer_backend = backend;
        }
        if let Some(resolver) = self.resolver {
            cfg.resolver = resolver;
        }
        cfg
    }
}

pub async fn run_downloader(cfg: FetchConfig) -> Result<()> {
    let upstreams = load_upstreams(&cfg.upstreams_file, cfg.upstream_port)?;
    let output_dir = cfg.output_dir()?;
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;
    let queue = TaskQueue::open(&cfg.tasks_file, &output_dir, cfg.min_descriptor_len)?;
    let copier: Arc<dyn BodyCopier> = Arc::from(copier_for(cfg.transfer_backend));
    tracing::info!(
        upstreams = upstreams.len(),
        backend = copier.name(),
        tasks = %cfg.tasks_file.display(),
        "run inputs loaded"
    );

    let (status_tx, mut status_rx) = tokio::sync::mpsc::channel::<StatusSnapshot>(16);
    let ctx = Arc::new(TaskContext::from_config(cfg)?.with_status(status_tx));
    let slot = Arc::new(TaskSlot::new(queue));

    let printer = tokio::spawn(async move {
        while let Some(snapshot) = status_rx.recv().await {
            let pct = match snapshot.total {
                Some(_) => format!("{:5.1}% ", snapshot.fraction() * 100.0),
                None => String::new(),
            };
            print!("\r{} {}{}   ", snapshot.name, pct, snapshot);
            let _ = std::io::stdout().flush();
        }
    });

    let summary =
        tokio::task::spawn_blocking(move || scheduler::run_pool(upstreams, slot, ctx, copier))
            .await??;

    // Checkpoint threads of finished tasks may still hold a sender.
    printer.abort();
    println!();

    for w in &summary.workers {
        tracing::debug!(
            upstream = %w.upstream,
            bytes = w.bytes,
            leases = w.leases,
            failures = w.failures,
            "worker finished"
        );
    }
    println!(
        "done: {} fetched, {} failed lease(s)",
        splitfetch_core::checkpoint::format_size(summary.total_bytes()),
        summary.total_failures()
    );
    Ok(())
}
