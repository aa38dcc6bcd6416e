//! Task execution runtime.
//!
//! This module provides the queue that orders tasks by their dependencies
//! and runs them on worker threads.

mod queue;

pub use queue::{QueueError, TaskQueue};
