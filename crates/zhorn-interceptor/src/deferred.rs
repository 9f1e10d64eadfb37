//! Deferred-task queue for shimmed attribute mutations.
//!
//! Tasks run only when the owner drains the queue, which stands in for the
//! host scheduler's next turn. A slot can be reserved before its task is
//! known; a drain stops at an unresolved reservation and leaves it, and
//! everything behind it, queued.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

use zhorn_core::HostError;

/// Identifier of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

type Task = Box<dyn FnOnce() -> Result<(), HostError> + Send>;

enum Slot {
    Reserved,
    Ready(Task),
}

/// FIFO queue of deferred mutations.
#[derive(Default)]
pub struct DeferredQueue {
    next_id: AtomicU64,
    tasks: Mutex<VecDeque<(TaskId, Slot)>>,
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("pending", &self.len())
            .finish()
    }
}

impl DeferredQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a task for the next drain.
    pub fn schedule<F>(&self, task: F) -> TaskId
    where
        F: FnOnce() -> Result<(), HostError> + Send + 'static,
    {
        let id = self.push(Slot::Ready(Box::new(task)));
        trace!(task_id = id.0, "Deferred task scheduled");
        id
    }

    /// Hold a place in the queue for a task supplied later with
    /// [`DeferredQueue::fill`].
    ///
    /// Until it is filled or cancelled, the reservation and every task behind
    /// it are skipped by [`DeferredQueue::run_pending`].
    pub fn reserve(&self) -> TaskId {
        let id = self.push(Slot::Reserved);
        trace!(task_id = id.0, "Deferred slot reserved");
        id
    }

    /// Supply the task for a reservation. Returns `false` when the id is no
    /// longer an open reservation; the task is dropped unrun.
    pub fn fill<F>(&self, id: TaskId, task: F) -> bool
    where
        F: FnOnce() -> Result<(), HostError> + Send + 'static,
    {
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match tasks.iter_mut().find(|(task_id, _)| *task_id == id) {
            Some((_, slot @ Slot::Reserved)) => {
                *slot = Slot::Ready(Box::new(task));
                trace!(task_id = id.0, "Deferred slot filled");
                true
            },
            _ => {
                warn!(task_id = id.0, "No open reservation to fill");
                false
            },
        }
    }

    fn push(&self, slot: Slot) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.push_back((id, slot));
        id
    }

    /// Cancel a task or reservation that has not run yet. Returns whether it
    /// was pending.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = tasks.len();
        tasks.retain(|(task_id, _)| *task_id != id);
        let cancelled = tasks.len() != before;
        if cancelled {
            trace!(task_id = id.0, "Deferred task cancelled");
        }
        cancelled
    }

    /// Run every task pending at the time of the call, in scheduling order,
    /// up to the first unresolved reservation.
    ///
    /// Tasks scheduled while draining wait for the next drain. Failing tasks
    /// are logged and do not stop the drain. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<(TaskId, Task)> = {
            let mut tasks = match self.tasks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let ready = tasks
                .iter()
                .take_while(|(_, slot)| matches!(slot, Slot::Ready(_)))
                .count();
            if ready < tasks.len() {
                trace!(
                    held = tasks.len().saturating_sub(ready),
                    "Drain stopped at an unresolved reservation"
                );
            }
            tasks
                .drain(..ready)
                .filter_map(|(id, slot)| match slot {
                    Slot::Ready(task) => Some((id, task)),
                    Slot::Reserved => None,
                })
                .collect()
        };

        let count = batch.len();
        for (id, task) in batch {
            if let Err(e) = task() {
                warn!(task_id = id.0, error = %e, "Deferred mutation failed");
            }
        }
        count
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or_default()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
