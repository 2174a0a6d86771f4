use crate::task::{ResourceTask, TaskQueue};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct SlotInner {
    current: Option<Arc<ResourceTask>>,
    queue: TaskQueue,
}

/// The shared "current task" pointer plus the queue it advances through.
pub struct TaskSlot {
    inner: Mutex<SlotInner>,
}

impl TaskSlot {
    /// Slot positioned at the first pending descriptor of `queue`.
    pub fn new(mut queue: TaskQueue) -> Self {
        let current = queue.next().map(|e| Arc::new(ResourceTask::new(e)));
        Self {
            inner: Mutex::new(SlotInner { current, queue }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Task workers should be fetching now; `None` once the queue is drained.
    pub fn current(&self) -> Option<Arc<ResourceTask>> {
        self.lock().current.clone()
    }

    /// Move past `finished`. Only the first caller for a given task advances;
    /// later callers see the slot already moved and get the new current task.
    pub fn advance(&self, finished: &Arc<ResourceTask>) -> Option<Arc<ResourceTask>> {
        let mut inner = self.lock();
        let still_current = inner
            .current
            .as_ref()
            .is_some_and(|c| Arc::ptr_eq(c, finished));
        if still_current {
            inner.current = inner.queue.next().map(|e| Arc::new(ResourceTask::new(e)));
            match &inner.current {
                Some(next) => {
                    tracing::info!(descriptor = %next.entry().descriptor, "next task")
                }
                None => tracing::info!("task list exhausted"),
            }
        }
        inner.current.clone()
    }
}
