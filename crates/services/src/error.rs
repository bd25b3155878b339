//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::SittingError;
use storage::repository::StorageError;

/// Errors emitted by the quiz-taking workflow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizTakeError {
    /// The sitting (or its quiz/question) is in the wrong state for the
    /// attempted operation.
    #[error(transparent)]
    InvalidState(#[from] SittingError),

    /// A retake was attempted where policy forbids it.
    #[error("quiz already completed; retake not permitted")]
    AlreadyCompleted,

    /// The referenced quiz, question, or sitting does not exist.
    #[error("referenced {0} does not exist")]
    NotFound(&'static str),

    /// The quiz has no questions to sit.
    #[error("quiz has no questions")]
    EmptyQuiz,

    /// Another writer mutated the sitting between read and write.
    #[error("concurrent modification of sitting")]
    ConcurrentModification,

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for QuizTakeError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => QuizTakeError::NotFound("record"),
            StorageError::Conflict => QuizTakeError::ConcurrentModification,
            other => QuizTakeError::Storage(other),
        }
    }
}
