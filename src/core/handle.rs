//! Shared task state and the handle dependents use to observe it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use super::types::TaskId;

struct TaskState {
    id: TaskId,
    name: String,
    cancelled: AtomicBool,
    succeeded: AtomicBool,
    // Published last. Readers that see `true` here also see the final
    // `succeeded` value: the watch channel's lock orders the two.
    finished: watch::Sender<bool>,
}

/// A non-owning view of a task.
///
/// Handles are what dependencies are declared against, what the queue
/// returns on submit, and how callers cancel or await a task. Cloning a
/// handle is cheap.
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            state: Arc::new(TaskState {
                id: TaskId::new(),
                name: name.into(),
                cancelled: AtomicBool::new(false),
                succeeded: AtomicBool::new(true),
                finished,
            }),
        }
    }

    /// The task's unique id.
    pub fn id(&self) -> TaskId {
        self.state.id
    }

    /// The task's name.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Request cancellation.
    ///
    /// Cancellation is cooperative: the task checks it before the start
    /// callback, before the body and before the terminal callbacks. A body
    /// that is already running runs to completion.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the task has not (yet) failed.
    ///
    /// Starts out `true` and only flips once the failure path runs. A task
    /// that was skipped by its gate or cancelled still reports `true`.
    pub fn succeeded(&self) -> bool {
        self.state.succeeded.load(Ordering::SeqCst)
    }

    /// Whether the task has finished, whatever the outcome.
    pub fn is_finished(&self) -> bool {
        *self.state.finished.borrow()
    }

    /// Wait until the task has finished.
    pub async fn wait_finished(&self) {
        let mut rx = self.state.finished.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|finished| *finished).await;
    }

    pub(crate) fn mark_failed(&self) {
        self.state.succeeded.store(false, Ordering::SeqCst);
    }

    pub(crate) fn mark_finished(&self) {
        self.state.finished.send_replace(true);
    }

    pub(crate) fn ptr_eq(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("cancelled", &self.is_cancelled())
            .field("succeeded", &self.succeeded())
            .field("finished", &self.is_finished())
            .finish()
    }
}
