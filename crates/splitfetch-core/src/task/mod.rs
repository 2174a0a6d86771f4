//! Resource tasks: the descriptor queue, the init-once guard, and the state
//! of the task currently being fetched.

mod active;
mod queue;
mod resource;

pub use active::ActiveTask;
pub use queue::{parse_entry, TaskEntry, TaskQueue};
pub use resource::ResourceTask;

use crate::checkpoint::StatusSnapshot;
use crate::config::FetchConfig;
use crate::resolver::{resolver_for, Resolver};
use crate::retry::RetryPolicy;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything task initialization and re-resolution need, shared by all
/// workers for the life of the pool.
pub struct TaskContext {
    pub config: FetchConfig,
    pub output_dir: PathBuf,
    pub resolver: Arc<dyn Resolver>,
    pub retry: RetryPolicy,
    pub status_tx: Option<mpsc::Sender<StatusSnapshot>>,
}

impl TaskContext {
    /// Context with the configured resolver and retry policy.
    pub fn from_config(config: FetchConfig) -> Result<Self> {
        let resolver = resolver_for(&config);
        Self::with_resolver(config, resolver)
    }

    pub fn with_resolver(config: FetchConfig, resolver: Arc<dyn Resolver>) -> Result<Self> {
        let output_dir = config.output_dir()?;
        let retry = RetryPolicy::from_config(config.retry.as_ref());
        Ok(Self {
            config,
            output_dir,
            resolver,
            retry,
            status_tx: None,
        })
    }

    /// Publish checkpoint status lines on `tx`.
    pub fn with_status(mut self, tx: mpsc::Sender<StatusSnapshot>) -> Self {
        self.status_tx = Some(tx);
        self
    }
}
