//! Testing utilities for users of the mold library.
//!
//! This module provides helpers for asserting on task lifecycles:
//!
//! - [`CallLog`]: Records every callback a task fires, in order, with the
//!   thread it ran on
//! - [`RecordingReporter`]: A failure reporter that keeps what it was given
//! - [`RecordingHandler`]: An event handler that keeps every event
//! - [`succeed_with`] / [`fail_with`]: Canned operations

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::core::operation::{FnOperation, TaskError, from_fn};
use crate::core::task::Task;
use crate::events::{Event, EventHandler};
use crate::report::FailureReporter;

/// Which callback fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start,
    Return,
    /// Debug form of the result.
    Success(String),
    /// Display form of the error.
    Failure(String),
}

impl Call {
    /// Whether this is a success or failure call.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Call::Success(_) | Call::Failure(_))
    }
}

/// A callback invocation.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call: Call,
    pub thread: ThreadId,
    pub thread_name: Option<String>,
}

/// Ordered record of lifecycle callbacks.
///
/// # Example
///
/// ```
/// use mold::Task;
/// use mold::testing::{Call, CallLog, succeed_with};
///
/// let log = CallLog::new();
/// let task = log.instrument(Task::new("answer", succeed_with(42)).callbacks_on_current_thread());
/// task.run();
///
/// assert_eq!(log.calls(), vec![Call::Start, Call::Return, Call::Success("42".into())]);
/// ```
#[derive(Clone, Default)]
pub struct CallLog {
    records: Arc<Mutex<Vec<CallRecord>>>,
}

impl CallLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install recorders in all four callback slots of `task`.
    ///
    /// Replaces whatever callbacks the task had.
    pub fn instrument<R>(&self, task: Task<R>) -> Task<R>
    where
        R: fmt::Debug + Send + 'static,
    {
        let (start, ret, success, failure) =
            (self.clone(), self.clone(), self.clone(), self.clone());
        task.on_start(move || start.record(Call::Start))
            .on_return(move || ret.record(Call::Return))
            .on_success(move |value| success.record(Call::Success(format!("{value:?}"))))
            .on_failure(move |err| failure.record(Call::Failure(err.to_string())))
    }

    /// Record a call made on the current thread.
    pub fn record(&self, call: Call) {
        let current = thread::current();
        self.lock().push(CallRecord {
            call,
            thread: current.id(),
            thread_name: current.name().map(str::to_owned),
        });
    }

    /// The calls recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().iter().map(|r| r.call.clone()).collect()
    }

    /// The full records, including threads.
    pub fn records(&self) -> Vec<CallRecord> {
        self.lock().clone()
    }

    /// Number of terminal (success or failure) calls.
    pub fn terminal_count(&self) -> usize {
        self.lock().iter().filter(|r| r.call.is_terminal()).count()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CallRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A failure reporter that stores `(surface, error)` pairs.
pub struct RecordingReporter<S> {
    reports: Mutex<Vec<(S, String)>>,
}

impl<S> RecordingReporter<S> {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
        }
    }
}

impl<S: Clone> RecordingReporter<S> {
    /// Reports received so far.
    pub fn reports(&self) -> Vec<(S, String)> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<S> Default for RecordingReporter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Send + Sync> FailureReporter<S> for RecordingReporter<S> {
    fn report(&self, error: &TaskError, surface: &S) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((surface.clone(), error.to_string()));
    }
}

/// An event handler that stores every event it receives.
pub struct RecordingHandler {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    /// Create an empty handler.
    pub fn new() -> Self {
        Self {
            events: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Events received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// An operation that returns a clone of `value`.
pub fn succeed_with<T>(
    value: T,
) -> FnOperation<impl FnMut() -> Result<T, TaskError> + Send + 'static>
where
    T: Clone + Send + 'static,
{
    from_fn(move || Ok(value.clone()))
}

/// An operation that fails with `message`.
pub fn fail_with<T>(
    message: impl Into<String>,
) -> FnOperation<impl FnMut() -> Result<T, TaskError> + Send + 'static>
where
    T: Send + 'static,
{
    let message = message.into();
    from_fn(move || Err(TaskError::msg(message.clone())))
}
