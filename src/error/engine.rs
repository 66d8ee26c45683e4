use thiserror::Error;

use super::ConfigError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Unrecoverable engine faults. Per-iteration failures never surface here;
/// they are absorbed into the metrics under reserved tags.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Metrics error: {message}")]
    Metrics { message: String },
    #[error("Scheduler error: {message}")]
    Scheduler { message: String },
}

impl EngineError {
    #[must_use]
    pub fn metrics(message: impl Into<String>) -> Self {
        Self::Metrics {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler {
            message: message.into(),
        }
    }
}
