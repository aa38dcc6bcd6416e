//! YAML configuration parsing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::callback::TaskOptions;

use super::error::ConfigError;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Queue configuration.
///
/// ```yaml
/// max_concurrency: 8
/// main_context: ui
/// task_defaults:
///   strict_dependency_gating: true
///   success: main_sync
///   failure: current
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of task bodies running at once.
    pub max_concurrency: usize,
    /// Thread name for a spawned main context. `None` leaves callbacks with
    /// a main affinity to whatever dispatcher the caller attaches.
    pub main_context: Option<String>,
    /// Options applied to tasks created through the queue.
    pub task_defaults: TaskOptions,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            main_context: None,
            task_defaults: TaskOptions::default(),
        }
    }
}

impl QueueConfig {
    /// Builder: set the concurrency limit.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Builder: set the task defaults.
    pub fn with_task_defaults(mut self, options: TaskOptions) -> Self {
        self.task_defaults = options;
        self
    }

    /// Check the configuration for values the queue cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_concurrency cannot be zero".into(),
            ));
        }
        if self.main_context.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::InvalidConfig(
                "main_context name cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Loads queue configuration from YAML.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<QueueConfig, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<QueueConfig, ConfigError> {
        let config: QueueConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}
