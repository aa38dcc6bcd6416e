//! Callback thread affinity and per-task options.
//!
//! Each of the four lifecycle callbacks (start, return, success, failure)
//! carries its own [`Affinity`]. [`TaskOptions`] bundles the four affinities
//! with the dependency gating switch so a queue can hand out uniformly
//! configured tasks.

use serde::{Deserialize, Serialize};

/// Where a lifecycle callback runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    /// Directly on the thread executing the task.
    Current,

    /// Queued onto the main context; the worker does not wait.
    #[default]
    MainAsync,

    /// Run on the main context while the worker blocks until it is done.
    ///
    /// The main context must never be blocked waiting on the same worker,
    /// or both sides deadlock. Tasks using it must run on a blocking thread
    /// (as the queue does), not directly inside an async task.
    MainSync,
}

impl Affinity {
    /// Whether the callback is routed through the main context.
    pub fn runs_on_main(self) -> bool {
        !matches!(self, Affinity::Current)
    }
}

/// Default configuration applied to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Skip the task when any dependency has failed.
    pub strict_dependency_gating: bool,
    /// Affinity of the start callback.
    pub start: Affinity,
    /// Affinity of the return callback.
    #[serde(rename = "return")]
    pub ret: Affinity,
    /// Affinity of the success callback.
    pub success: Affinity,
    /// Affinity of the failure callback.
    pub failure: Affinity,
}

impl TaskOptions {
    /// Every callback queued asynchronously onto the main context.
    pub fn all_async() -> Self {
        Self {
            strict_dependency_gating: true,
            start: Affinity::MainAsync,
            ret: Affinity::MainAsync,
            success: Affinity::MainAsync,
            failure: Affinity::MainAsync,
        }
    }

    /// Like [`all_async`](Self::all_async), but the success callback runs
    /// synchronously on the main context.
    pub fn sync_success() -> Self {
        Self {
            success: Affinity::MainSync,
            ..Self::all_async()
        }
    }

    /// Every callback runs on the executing thread.
    pub fn current_thread() -> Self {
        Self {
            strict_dependency_gating: true,
            start: Affinity::Current,
            ret: Affinity::Current,
            success: Affinity::Current,
            failure: Affinity::Current,
        }
    }

    /// Builder: set the dependency gating switch.
    pub fn with_strict_dependency_gating(mut self, strict: bool) -> Self {
        self.strict_dependency_gating = strict;
        self
    }
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self::all_async()
    }
}
