use thiserror::Error;

use tickwork_core::{ConfigError, RegistryError, TaskError, TaskKey};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("task {key} failed: {source}")]
    Task {
        key: TaskKey,
        #[source]
        source: TaskError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SchedulerError {
    /// Key of the failed task, for [`SchedulerError::Task`].
    pub fn task_key(&self) -> Option<&TaskKey> {
        match self {
            SchedulerError::Task { key, .. } => Some(key),
            _ => None,
        }
    }
}
