//! crates/adaptive_quiz_core/src/error.rs
//!
//! Error type returned by the quiz engine's operations.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    /// The requested question or assignment does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The user has not chosen a language or level yet.
    #[error("Learner profile incomplete: {0}")]
    IncompleteProfile(String),

    #[error("Storage error: {0}")]
    Port(PortError),
}

impl From<PortError> for QuizError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => QuizError::NotFound(what),
            other => QuizError::Port(other),
        }
    }
}

pub type QuizResult<T> = Result<T, QuizError>;
