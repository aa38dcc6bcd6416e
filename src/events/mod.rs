//! Lifecycle events and event handling.
//!
//! The [`TaskQueue`](crate::TaskQueue) emits an event when a task is queued,
//! when its body is handed to a worker, and when its run ends.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::task::RunOutcome;
use crate::core::types::TaskId;

/// Lifecycle events emitted by the queue.
#[derive(Debug, Clone)]
pub enum Event {
    /// A task was submitted.
    TaskQueued {
        task_id: TaskId,
        name: String,
        dependencies: usize,
        timestamp: Instant,
    },

    /// A task's dependencies finished and it got a worker.
    TaskStarted {
        task_id: TaskId,
        name: String,
        timestamp: Instant,
    },

    /// A task's gate was closed.
    TaskSkipped {
        task_id: TaskId,
        name: String,
        timestamp: Instant,
    },

    /// A task observed cancellation.
    TaskCancelled {
        task_id: TaskId,
        name: String,
        timestamp: Instant,
    },

    /// A task's operation produced a result.
    TaskSucceeded {
        task_id: TaskId,
        name: String,
        duration: Duration,
        timestamp: Instant,
    },

    /// A task's operation failed (or panicked).
    TaskFailed {
        task_id: TaskId,
        name: String,
        error: String,
        duration: Duration,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::TaskQueued { timestamp, .. } => *timestamp,
            Event::TaskStarted { timestamp, .. } => *timestamp,
            Event::TaskSkipped { timestamp, .. } => *timestamp,
            Event::TaskCancelled { timestamp, .. } => *timestamp,
            Event::TaskSucceeded { timestamp, .. } => *timestamp,
            Event::TaskFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the id of the task the event is about.
    pub fn task_id(&self) -> TaskId {
        match self {
            Event::TaskQueued { task_id, .. }
            | Event::TaskStarted { task_id, .. }
            | Event::TaskSkipped { task_id, .. }
            | Event::TaskCancelled { task_id, .. }
            | Event::TaskSucceeded { task_id, .. }
            | Event::TaskFailed { task_id, .. } => *task_id,
        }
    }

    /// Create a TaskQueued event.
    pub fn task_queued(task_id: TaskId, name: impl Into<String>, dependencies: usize) -> Self {
        Event::TaskQueued {
            task_id,
            name: name.into(),
            dependencies,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskStarted event.
    pub fn task_started(task_id: TaskId, name: impl Into<String>) -> Self {
        Event::TaskStarted {
            task_id,
            name: name.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskFailed event.
    pub fn task_failed(
        task_id: TaskId,
        name: impl Into<String>,
        error: String,
        duration: Duration,
    ) -> Self {
        Event::TaskFailed {
            task_id,
            name: name.into(),
            error,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create the event describing how a run ended.
    pub fn from_outcome(
        task_id: TaskId,
        name: impl Into<String>,
        outcome: RunOutcome,
        duration: Duration,
    ) -> Self {
        let name = name.into();
        let timestamp = Instant::now();
        match outcome {
            RunOutcome::Skipped => Event::TaskSkipped {
                task_id,
                name,
                timestamp,
            },
            RunOutcome::Cancelled => Event::TaskCancelled {
                task_id,
                name,
                timestamp,
            },
            RunOutcome::Succeeded => Event::TaskSucceeded {
                task_id,
                name,
                duration,
                timestamp,
            },
            RunOutcome::Failed { error } => Event::TaskFailed {
                task_id,
                name,
                error,
                duration,
                timestamp,
            },
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
