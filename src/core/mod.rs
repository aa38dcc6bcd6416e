//! Core task types.

pub mod callback;
pub mod handle;
pub mod operation;
pub mod task;
pub mod types;
