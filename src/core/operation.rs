//! Operation trait and error types.
//!
//! An `Operation` is the body of a [`Task`](super::task::Task): the step that
//! produces a result or fails. Implement this trait to define custom work;
//! for one-off closures use [`from_fn`].

use thiserror::Error;

/// Errors produced while computing a task's result.
///
/// These are opaque to the task itself: whatever the operation returns is
/// forwarded untouched to the failure callback.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Operation failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The operation panicked. Only ever reported through events and logs,
    /// the panic itself keeps unwinding.
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Create a message-only failure.
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError::ExecutionFailed(message.into())
    }

    /// Wrap any error.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TaskError::Other(Box::new(error))
    }
}

/// The result-producing capability of a task.
///
/// # Example
///
/// ```
/// use mold::{Operation, TaskError};
///
/// struct Parse {
///     input: String,
/// }
///
/// impl Operation for Parse {
///     type Output = i64;
///
///     fn make_result(&mut self) -> Result<i64, TaskError> {
///         self.input.trim().parse().map_err(TaskError::other)
///     }
/// }
/// ```
pub trait Operation: Send + 'static {
    /// The value handed to the success callback.
    type Output: Send + 'static;

    /// Produce the task's result.
    ///
    /// Runs synchronously, to completion, on whichever worker thread the
    /// queue assigns. There is no seed value.
    fn make_result(&mut self) -> Result<Self::Output, TaskError>;

    /// Whether the task should run at all once it is started.
    ///
    /// Returning `false` makes the run a silent no-op: none of the callbacks
    /// fire and the task is not marked as failed. Callers that need to know
    /// about skipped work must check the returned outcome or encode the skip
    /// as a failure.
    fn should_execute(&self) -> bool {
        true
    }
}

/// An [`Operation`] backed by a closure.
pub struct FnOperation<F> {
    body: F,
    gate: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

/// Build an operation from a closure.
pub fn from_fn<F, R>(body: F) -> FnOperation<F>
where
    F: FnMut() -> Result<R, TaskError> + Send + 'static,
    R: Send + 'static,
{
    FnOperation { body, gate: None }
}

impl<F> FnOperation<F> {
    /// Install a custom gate, consulted before the body runs.
    pub fn when(mut self, gate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.gate = Some(Box::new(gate));
        self
    }
}

impl<F, R> Operation for FnOperation<F>
where
    F: FnMut() -> Result<R, TaskError> + Send + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn make_result(&mut self) -> Result<R, TaskError> {
        (self.body)()
    }

    fn should_execute(&self) -> bool {
        self.gate.as_ref().is_none_or(|gate| gate())
    }
}
