use quiz_core::model::{
    Category, Choice, CourseId, Question, QuestionId, QuizId, SittingId, UserId,
};
use sqlx::Row;

use crate::repository::{SittingRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn quiz_id_from_i64(v: i64) -> Result<QuizId, StorageError> {
    Ok(QuizId::new(i64_to_u64("quiz_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn sitting_id_from_i64(v: i64) -> Result<SittingId, StorageError> {
    Ok(SittingId::new(i64_to_u64("sitting_id", v)?))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u8_from_i64(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Storage encoding for the question kind column.
pub(crate) const KIND_MULTIPLE_CHOICE: &str = "multiple_choice";
pub(crate) const KIND_ESSAY: &str = "essay";

/// Assembles a `Question` from its row plus its choice rows.
///
/// Choice rows must belong to the question; essay questions ignore them.
pub(crate) fn build_question(
    id: QuestionId,
    prompt: String,
    category: Option<String>,
    kind: &str,
    choices: Vec<Choice>,
) -> Result<Question, StorageError> {
    let category = category.map(Category::new).transpose().map_err(ser)?;
    match kind {
        KIND_MULTIPLE_CHOICE => {
            Question::multiple_choice(id, prompt, category, choices).map_err(ser)
        }
        KIND_ESSAY => Question::essay(id, prompt, category).map_err(ser),
        other => Err(StorageError::Serialization(format!(
            "invalid question kind: {other}"
        ))),
    }
}

pub(crate) fn map_choice_row(row: &sqlx::sqlite::SqliteRow) -> Result<Choice, StorageError> {
    let choice_id = u32_from_i64("choice_id", row.try_get::<i64, _>("choice_id").map_err(ser)?)?;
    let text: String = row.try_get("text").map_err(ser)?;
    let correct: bool = row.try_get::<i64, _>("correct").map_err(ser)? != 0;
    Ok(Choice::new(choice_id, text, correct))
}

pub(crate) fn map_sitting_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SittingRecord, StorageError> {
    Ok(SittingRecord {
        id: sitting_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        quiz_id: quiz_id_from_i64(row.try_get::<i64, _>("quiz_id").map_err(ser)?)?,
        course_id: course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        question_order: row.try_get("question_order").map_err(ser)?,
        remaining: row.try_get("remaining").map_err(ser)?,
        incorrect: row.try_get("incorrect").map_err(ser)?,
        answers: row.try_get("answers").map_err(ser)?,
        score: u32_from_i64("score", row.try_get::<i64, _>("score").map_err(ser)?)?,
        complete: row.try_get::<i64, _>("complete").map_err(ser)? != 0,
        started_at: row.try_get("started_at").map_err(ser)?,
        ended_at: row.try_get("ended_at").map_err(ser)?,
        approved_at: row.try_get("approved_at").map_err(ser)?,
        certificate_code: row.try_get("certificate_code").map_err(ser)?,
        version: i64_to_u64("version", row.try_get::<i64, _>("version").map_err(ser)?)?,
    })
}
