//! mold - single-run tasks with lifecycle callbacks.
//!
//! A [`Task`] wraps an [`Operation`] with start, return, success and failure
//! callbacks. Each callback runs either on the worker thread or on a
//! designated serial context ([`MainContext`]). Tasks declare dependencies on
//! each other's [`TaskHandle`]s; by default a task whose dependency failed is
//! skipped without firing any callback.
//!
//! Failures are silent unless a failure callback is registered, either
//! directly with [`Task::on_failure`] or through
//! [`Task::report_failures_to`]. An unobserved failure only clears the
//! task's `succeeded` flag.

pub mod config;
pub mod core;
pub mod dispatch;
pub mod events;
pub mod execution;
pub mod report;
pub mod testing;

pub use config::{ConfigError, ConfigLoader, QueueConfig};
pub use core::callback::{Affinity, TaskOptions};
pub use core::handle::TaskHandle;
pub use core::operation::{FnOperation, Operation, TaskError, from_fn};
pub use core::task::{RunOutcome, Task};
pub use core::types::TaskId;
pub use dispatch::{DispatchError, Dispatcher, Immediate, Job, MainContext, MainLoop};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{QueueError, TaskQueue};
pub use report::{FailureReporter, LogReporter};
