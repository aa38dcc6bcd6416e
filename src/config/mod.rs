//! Configuration loading and parsing.
//!
//! Queue settings and the task defaults a queue hands out are read from YAML.

mod error;
mod yaml;

pub use error::ConfigError;
pub use yaml::{ConfigLoader, QueueConfig};
