//! Init-once guard around a queued task.

use super::{ActiveTask, TaskContext, TaskEntry};
use std::sync::{Arc, Mutex, PoisonError};

enum InitState {
    Pending,
    Ready(Arc<ActiveTask>),
    /// Initialization failed; the task is skipped.
    Abandoned,
    /// The destination was already complete.
    AlreadyDone,
}

/// A descriptor taken from the queue. The first worker to reach it runs
/// initialization; the others wait on the guard and share the result.
pub struct ResourceTask {
    entry: TaskEntry,
    init: Mutex<InitState>,
}

impl ResourceTask {
    pub fn new(entry: TaskEntry) -> Self {
        Self {
            entry,
            init: Mutex::new(InitState::Pending),
        }
    }

    pub fn entry(&self) -> &TaskEntry {
        &self.entry
    }

    /// The initialized task, or `None` if it was abandoned or already done.
    pub fn ensure_initialized(&self, ctx: &Arc<TaskContext>) -> Option<Arc<ActiveTask>> {
        let mut state = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            InitState::Ready(task) => return Some(Arc::clone(task)),
            InitState::Abandoned | InitState::AlreadyDone => return None,
            InitState::Pending => {}
        }
        match ActiveTask::initialize(&self.entry, ctx) {
            Ok(Some(task)) => {
                *state = InitState::Ready(Arc::clone(&task));
                Some(task)
            }
            Ok(None) => {
                *state = InitState::AlreadyDone;
                None
            }
            Err(e) => {
                tracing::warn!(descriptor = %self.entry.descriptor, "abandoning task: {:#}", e);
                *state = InitState::Abandoned;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::resolver::{ResolvedLocator, Resolver};
    use crate::retry::RetryPolicy;
    use anyhow::Result;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Slow {
        calls: AtomicU32,
        fail: bool,
    }

    impl Resolver for Slow {
        fn resolve(&self, descriptor: &str) -> Result<ResolvedLocator> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            if self.fail {
                anyhow::bail!("gone");
            }
            Ok(ResolvedLocator::new(format!("http://127.0.0.1:9/{}", descriptor)))
        }
    }

    fn context(dir: &std::path::Path, resolver: Arc<Slow>) -> Arc<TaskContext> {
        let cfg = FetchConfig {
            download_dir: Some(dir.to_path_buf()),
            probe_length: false,
            checkpoint_interval_secs: 3600,
            ..FetchConfig::default()
        };
        let mut ctx = TaskContext::with_resolver(cfg, resolver).unwrap();
        ctx.retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        Arc::new(ctx)
    }

    #[test]
    fn racing_workers_initialize_once() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(Slow {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let ctx = context(dir.path(), resolver.clone());
        let resource = Arc::new(ResourceTask::new(TaskEntry {
            descriptor: "a.bin".into(),
            name: None,
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resource = Arc::clone(&resource);
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || resource.ensure_initialized(&ctx))
            })
            .collect();
        let tasks: Vec<Arc<ActiveTask>> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert!(tasks.iter().all(|t| Arc::ptr_eq(t, &tasks[0])));
    }

    #[test]
    fn failed_resolution_abandons_task() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(Slow {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let ctx = context(dir.path(), resolver.clone());
        let resource = ResourceTask::new(TaskEntry {
            descriptor: "b.bin".into(),
            name: None,
        });
        assert!(resource.ensure_initialized(&ctx).is_none());
        assert!(resource.ensure_initialized(&ctx).is_none());
        // Two attempts from the retry budget, none afterwards.
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
        assert!(!dir.path().join("b.bin").exists());
    }
}
