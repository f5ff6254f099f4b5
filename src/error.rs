use thiserror::Error;

use crate::model::Phase;

/// Failure reported by a content generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The reply did not match the expected structure.
    #[error("generator returned an unexpected format: {0}")]
    InvalidFormat(String),

    /// Transport or service failure, message kept verbatim.
    #[error("{0}")]
    Failure(String),
}

impl GeneratorError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }

    /// Wraps a transport error chain into a single message.
    pub fn failure(err: &anyhow::Error) -> Self {
        Self::Failure(format!("{err:#}"))
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not allowed in {actual} phase (expected {expected})")]
    InvalidPhase { expected: Phase, actual: Phase },

    #[error("another generation request is still in progress")]
    Busy,

    #[error("only the latest page can be approved (viewing {view}, latest is {write})")]
    NotAtLatestPage {
        view: crate::model::Cursor,
        write: crate::model::Cursor,
    },

    #[error("generator returned an unexpected format: {0}")]
    GeneratorInvalidFormat(String),

    #[error("generation failed: {0}")]
    GeneratorFailure(String),

    #[error("saved draft is corrupted and was discarded: {0}")]
    StorageCorrupt(String),

    #[error("draft storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(err: &anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

impl From<GeneratorError> for WorkflowError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::InvalidFormat(message) => Self::GeneratorInvalidFormat(message),
            GeneratorError::Failure(message) => Self::GeneratorFailure(message),
        }
    }
}
