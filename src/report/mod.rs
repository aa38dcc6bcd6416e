//! Failure reporting bound to a presenting surface.
//!
//! [`Task::report_failures_to`] replaces a task's failure callback with one
//! that hands the error to a [`FailureReporter`] together with the surface
//! it should be shown on. The task holds only a weak reference to the
//! surface; if the surface is gone by the time the task fails, the report
//! is dropped.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use crate::core::operation::TaskError;
use crate::core::task::Task;

/// An external sink that shows a task failure to the user.
pub trait FailureReporter<S: ?Sized>: Send + Sync {
    /// Report `error` on `surface`.
    fn report(&self, error: &TaskError, surface: &S);
}

/// A reporter that records failures as `tracing` error events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl<S: fmt::Debug + ?Sized> FailureReporter<S> for LogReporter {
    fn report(&self, err: &TaskError, surface: &S) {
        error!(surface = ?surface, error = %err, "task failed");
    }
}

impl<R: Send + 'static> Task<R> {
    /// Report failures on `surface` through `reporter`.
    ///
    /// Overwrites the failure callback. Only a weak reference to the surface
    /// is kept.
    pub fn report_failures_to<S, P>(self, surface: &Arc<S>, reporter: Arc<P>) -> Self
    where
        S: Send + Sync + ?Sized + 'static,
        P: FailureReporter<S> + ?Sized + 'static,
    {
        let surface = Arc::downgrade(surface);
        let task = self.name().to_owned();
        self.on_failure(move |err| match surface.upgrade() {
            Some(surface) => reporter.report(&err, &surface),
            None => debug!(task = %task, error = %err, "surface gone, failure not reported"),
        })
    }
}
