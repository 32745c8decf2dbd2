use thiserror::Error;

/// Structural invariant violations inside the task registry.
///
/// These indicate a bug. Callers must not try to repair the registry after
/// receiving one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry corrupted at level {level}: {detail}")]
    Corrupted { level: usize, detail: String },

    #[error("node {0} is linked but holds no task")]
    MissingTask(usize),

    #[error("index and level-0 chain disagree: {0}")]
    IndexMismatch(String),
}

impl RegistryError {
    pub(crate) fn corrupted(level: usize, detail: impl Into<String>) -> Self {
        RegistryError::Corrupted {
            level,
            detail: detail.into(),
        }
    }
}

/// Failure raised by a task's action or one of its callbacks.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("frame duration must be positive, got {0}ms")]
    InvalidFrameDuration(u64),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
