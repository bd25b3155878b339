mod certificate;
mod ids;
mod progress;
mod question;
mod quiz;
mod sitting;

pub use certificate::{CertificateCode, CertificateCodeError};
pub use ids::{CourseId, ParseIdError, QuestionId, QuizId, SittingId, UserId};

pub use progress::{CategoryScore, Progress};
pub use question::{Category, Choice, Question, QuestionError, QuestionVariant};
pub use quiz::{Quiz, QuizError, QuizFlags};
pub use sitting::{
    passed, AnswerOutcome, FinalizeOutcome, Sitting, SittingError,
};
