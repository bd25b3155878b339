use thiserror::Error;

use crate::model::{CertificateCodeError, QuestionError, QuizError, SittingError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Sitting(#[from] SittingError),
    #[error(transparent)]
    Certificate(#[from] CertificateCodeError),
}
