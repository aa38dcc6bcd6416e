//! The task: a single-run unit of work with lifecycle callbacks.
//!
//! A [`Task`] wraps an [`Operation`] with four callback slots and a gate:
//!
//! 1. the gate is evaluated; if it is closed the run is a silent no-op
//! 2. the start callback fires
//! 3. the operation runs
//! 4. the return callback fires, but only if every dependency has finished
//! 5. exactly one of the success or failure callbacks fires
//!
//! Cancellation is checked before the start callback, before the body and
//! before the terminal callbacks. Once it is observed nothing else fires.
//!
//! Failures that nobody registered a failure callback for are swallowed.
//! The only trace left is the task's `succeeded` flag, which dependents
//! read when deciding whether to run.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, warn};

use crate::dispatch::{Dispatcher, Job};

use super::callback::{Affinity, TaskOptions};
use super::handle::TaskHandle;
use super::operation::{FnOperation, Operation, TaskError, from_fn};
use super::types::TaskId;

type VoidCallback = Box<dyn FnOnce() + Send + 'static>;
type SuccessCallback<R> = Box<dyn FnOnce(R) + Send + 'static>;
type FailureCallback = Box<dyn FnOnce(TaskError) + Send + 'static>;

struct Slot<F> {
    callback: Option<F>,
    affinity: Affinity,
}

impl<F> Slot<F> {
    fn new(affinity: Affinity) -> Self {
        Self {
            callback: None,
            affinity,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The gate was closed; nothing ran.
    Skipped,
    /// Cancellation was observed at one of the check points.
    Cancelled,
    /// The operation produced a result.
    Succeeded,
    /// The operation failed.
    Failed {
        /// Display form of the error handed to the failure callback.
        error: String,
    },
}

impl RunOutcome {
    /// Short label for logs and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Skipped => "skipped",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed { .. } => "failed",
        }
    }
}

/// A single-run unit of work producing an `R`.
///
/// # Example
///
/// ```
/// use mold::{Task, TaskError};
///
/// let task = Task::from_fn("answer", || Ok::<_, TaskError>(42))
///     .callbacks_on_current_thread()
///     .on_success(|value| assert_eq!(value, 42));
///
/// let handle = task.handle();
/// task.run();
/// assert!(handle.is_finished());
/// ```
pub struct Task<R> {
    handle: TaskHandle,
    operation: Box<dyn Operation<Output = R>>,
    dependencies: Vec<TaskHandle>,
    strict_dependency_gating: bool,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    start: Slot<VoidCallback>,
    ret: Slot<VoidCallback>,
    success: Slot<SuccessCallback<R>>,
    failure: Slot<FailureCallback>,
}

impl<R: Send + 'static> Task<R> {
    /// Create a task around an operation, with default options.
    pub fn new(name: impl Into<String>, operation: impl Operation<Output = R>) -> Self {
        let options = TaskOptions::default();
        Self {
            handle: TaskHandle::new(name),
            operation: Box::new(operation),
            dependencies: Vec::new(),
            strict_dependency_gating: options.strict_dependency_gating,
            dispatcher: None,
            start: Slot::new(options.start),
            ret: Slot::new(options.ret),
            success: Slot::new(options.success),
            failure: Slot::new(options.failure),
        }
    }

    /// Create a task from a closure.
    pub fn from_fn<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnMut() -> Result<R, TaskError> + Send + 'static,
        FnOperation<F>: Operation<Output = R>,
    {
        Self::new(name, from_fn(body))
    }

    /// The handle dependents and callers use to observe this task.
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    /// The task's unique id.
    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    /// The task's name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Tasks this one waits on.
    pub fn dependencies(&self) -> &[TaskHandle] {
        &self.dependencies
    }

    /// Whether a dispatcher has been configured.
    pub fn has_dispatcher(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Set the callback fired before the operation runs.
    pub fn on_start(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.start.callback = Some(Box::new(callback));
        self
    }

    /// Set the callback fired once the operation resolved and every
    /// dependency has finished.
    pub fn on_return(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.ret.callback = Some(Box::new(callback));
        self
    }

    /// Set the callback receiving the operation's result.
    pub fn on_success(mut self, callback: impl FnOnce(R) + Send + 'static) -> Self {
        self.success.callback = Some(Box::new(callback));
        self
    }

    /// Set the callback receiving the operation's error.
    ///
    /// Replaces any failure callback set before, including one installed by
    /// [`report_failures_to`](Task::report_failures_to).
    pub fn on_failure(mut self, callback: impl FnOnce(TaskError) + Send + 'static) -> Self {
        self.failure.callback = Some(Box::new(callback));
        self
    }

    /// Set where the start callback runs.
    pub fn start_affinity(mut self, affinity: Affinity) -> Self {
        self.start.affinity = affinity;
        self
    }

    /// Set where the return callback runs.
    pub fn return_affinity(mut self, affinity: Affinity) -> Self {
        self.ret.affinity = affinity;
        self
    }

    /// Set where the success callback runs.
    pub fn success_affinity(mut self, affinity: Affinity) -> Self {
        self.success.affinity = affinity;
        self
    }

    /// Set where the failure callback runs.
    pub fn failure_affinity(mut self, affinity: Affinity) -> Self {
        self.failure.affinity = affinity;
        self
    }

    /// Run every callback on the executing thread.
    pub fn callbacks_on_current_thread(self) -> Self {
        self.start_affinity(Affinity::Current)
            .return_affinity(Affinity::Current)
            .success_affinity(Affinity::Current)
            .failure_affinity(Affinity::Current)
    }

    /// Apply a set of options, replacing affinities and gating.
    pub fn with_options(mut self, options: &TaskOptions) -> Self {
        self.strict_dependency_gating = options.strict_dependency_gating;
        self.start.affinity = options.start;
        self.ret.affinity = options.ret;
        self.success.affinity = options.success;
        self.failure.affinity = options.failure;
        self
    }

    /// Skip the task when a dependency has failed (on by default).
    pub fn strict_dependency_gating(mut self, strict: bool) -> Self {
        self.strict_dependency_gating = strict;
        self
    }

    /// Wait for another task before running.
    ///
    /// Depending on the same task twice is a no-op.
    pub fn depends_on(mut self, dependency: &TaskHandle) -> Self {
        if !self.dependencies.iter().any(|d| d.ptr_eq(dependency)) {
            self.dependencies.push(dependency.clone());
        }
        self
    }

    /// Set the dispatcher main-affinity callbacks are sent to.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Evaluate the gate.
    ///
    /// Closed when the operation declines to run, or, with strict dependency
    /// gating, when any dependency has failed.
    pub fn should_execute(&self) -> bool {
        if !self.operation.should_execute() {
            return false;
        }
        if self.strict_dependency_gating {
            return self.dependencies.iter().all(TaskHandle::succeeded);
        }
        true
    }

    /// Execute the task.
    ///
    /// Consumes the task, so a task runs at most once. The handle is marked
    /// finished when this returns, or unwinds.
    pub fn run(mut self) -> RunOutcome {
        let span = info_span!("task_run", task = %self.handle.name(), id = %self.handle.id());
        let _enter = span.enter();
        let _finish = FinishGuard(self.handle.clone());

        if !self.should_execute() {
            debug!("gate closed, skipping");
            return RunOutcome::Skipped;
        }

        if self.handle.is_cancelled() {
            debug!("cancelled before start");
            return RunOutcome::Cancelled;
        }
        if let Some(start) = self.start.callback.take() {
            self.dispatch(self.start.affinity, start);
        }

        if self.handle.is_cancelled() {
            debug!("cancelled before body");
            return RunOutcome::Cancelled;
        }

        let started = Instant::now();
        let result = self.operation.make_result();
        debug!(elapsed = ?started.elapsed(), ok = result.is_ok(), "operation resolved");

        if self.handle.is_cancelled() {
            debug!("cancelled before completion callbacks");
            return RunOutcome::Cancelled;
        }

        match result {
            Ok(value) => {
                self.run_return_callback();
                if let Some(success) = self.success.callback.take() {
                    self.dispatch(self.success.affinity, Box::new(move || success(value)));
                }
                RunOutcome::Succeeded
            }
            Err(error) => {
                self.handle.mark_failed();
                let message = error.to_string();
                self.run_return_callback();
                match self.failure.callback.take() {
                    Some(failure) => {
                        self.dispatch(self.failure.affinity, Box::new(move || failure(error)));
                    }
                    None => debug!(error = %message, "failure without a failure callback"),
                }
                RunOutcome::Failed { error: message }
            }
        }
    }

    fn run_return_callback(&mut self) {
        if !self.dependencies.iter().all(TaskHandle::is_finished) {
            debug!("dependencies still running, return callback withheld");
            return;
        }
        if let Some(ret) = self.ret.callback.take() {
            self.dispatch(self.ret.affinity, ret);
        }
    }

    fn dispatch(&self, affinity: Affinity, job: Job) {
        let Some(dispatcher) = self.dispatcher.as_ref().filter(|_| affinity.runs_on_main()) else {
            if affinity.runs_on_main() {
                warn!("no dispatcher configured, running callback on the current thread");
            }
            job();
            return;
        };

        let result = match affinity {
            Affinity::MainSync => dispatcher.dispatch_sync(job),
            _ => dispatcher.dispatch_async(job),
        };
        if let Err(err) = result {
            warn!(error = %err, ?affinity, "callback dispatch failed");
        }
    }
}

impl<R> fmt::Debug for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("handle", &self.handle)
            .field("dependencies", &self.dependencies.len())
            .field("strict_dependency_gating", &self.strict_dependency_gating)
            .field("has_dispatcher", &self.dispatcher.is_some())
            .finish_non_exhaustive()
    }
}

impl<R> Drop for Task<R> {
    /// A task dropped without running counts as failed, so nothing waits on
    /// it forever.
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!(task = %self.handle.name(), "dropped without running");
            self.handle.mark_failed();
            self.handle.mark_finished();
        }
    }
}

/// Publishes `finished` on every exit path. A run that unwinds is also
/// recorded as failed so dependents do not treat it as a success.
struct FinishGuard(TaskHandle);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.mark_failed();
        }
        self.0.mark_finished();
    }
}
