use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{CourseId, QuestionId, QuizId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("pass mark must be a percentage (0-100), got {0}")]
    InvalidPassMark(u8),

    #[error("max questions must be > 0 when set")]
    InvalidMaxQuestions,

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),
}

//
// ─── FLAGS ─────────────────────────────────────────────────────────────────────
//

/// Behaviour switches for a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct QuizFlags {
    /// Shuffle the question order for each sitting.
    pub randomize_order: bool,
    /// Reveal correct answers only once the sitting is finished.
    pub answers_at_end: bool,
    /// Permit a single completed attempt, pass or fail.
    pub single_attempt: bool,
    /// Retain sitting records after completion (certificate/report source).
    pub exam_paper: bool,
    /// Hidden from students; sittings cannot be started.
    pub draft: bool,
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// A quiz definition: a pass threshold over an ordered set of questions.
///
/// The question list keeps insertion order; that order is the deterministic
/// sitting order when `randomize_order` is off.
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    id: QuizId,
    course_id: CourseId,
    title: String,
    pass_mark: u8,
    question_ids: Vec<QuestionId>,
    max_questions: Option<u32>,
    flags: QuizFlags,
    created_at: DateTime<Utc>,
}

impl Quiz {
    /// Creates a new quiz.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyTitle` for a blank title,
    /// `QuizError::InvalidPassMark` for a mark above 100,
    /// `QuizError::InvalidMaxQuestions` for a zero cap, and
    /// `QuizError::DuplicateQuestion` when a question id repeats.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuizId,
        course_id: CourseId,
        title: impl Into<String>,
        pass_mark: u8,
        question_ids: Vec<QuestionId>,
        max_questions: Option<u32>,
        flags: QuizFlags,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuizError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(QuizError::EmptyTitle);
        }
        if pass_mark > 100 {
            return Err(QuizError::InvalidPassMark(pass_mark));
        }
        if max_questions == Some(0) {
            return Err(QuizError::InvalidMaxQuestions);
        }

        let mut seen = HashSet::with_capacity(question_ids.len());
        for qid in &question_ids {
            if !seen.insert(*qid) {
                return Err(QuizError::DuplicateQuestion(*qid));
            }
        }

        Ok(Self {
            id,
            course_id,
            title: title.trim().to_owned(),
            pass_mark,
            question_ids,
            max_questions,
            flags,
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Minimum percentage required to pass.
    #[must_use]
    pub fn pass_mark(&self) -> u8 {
        self.pass_mark
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    /// Optional cap on how many questions one sitting draws.
    #[must_use]
    pub fn max_questions(&self) -> Option<u32> {
        self.max_questions
    }

    #[must_use]
    pub fn flags(&self) -> QuizFlags {
        self.flags
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True when the quiz has no questions to sit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.question_ids.is_empty()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn qids(ids: &[u64]) -> Vec<QuestionId> {
        ids.iter().copied().map(QuestionId::new).collect()
    }

    #[test]
    fn quiz_rejects_empty_title() {
        let err = Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            "   ",
            75,
            qids(&[1]),
            None,
            QuizFlags::default(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuizError::EmptyTitle);
    }

    #[test]
    fn quiz_rejects_pass_mark_over_100() {
        let err = Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            "Safety induction",
            101,
            qids(&[1]),
            None,
            QuizFlags::default(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuizError::InvalidPassMark(101));
    }

    #[test]
    fn quiz_rejects_duplicate_questions() {
        let err = Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            "Safety induction",
            75,
            qids(&[1, 2, 1]),
            None,
            QuizFlags::default(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuizError::DuplicateQuestion(QuestionId::new(1)));
    }

    #[test]
    fn quiz_trims_title_and_keeps_order() {
        let quiz = Quiz::new(
            QuizId::new(1),
            CourseId::new(2),
            "  Working at height  ",
            80,
            qids(&[3, 1, 2]),
            Some(10),
            QuizFlags {
                exam_paper: true,
                ..QuizFlags::default()
            },
            fixed_now(),
        )
        .unwrap();

        assert_eq!(quiz.title(), "Working at height");
        assert_eq!(quiz.question_ids(), &qids(&[3, 1, 2])[..]);
        assert_eq!(quiz.max_questions(), Some(10));
        assert!(quiz.flags().exam_paper);
        assert!(!quiz.is_empty());
    }

    #[test]
    fn quiz_rejects_zero_max_questions() {
        let err = Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            "Safety induction",
            75,
            qids(&[1]),
            Some(0),
            QuizFlags::default(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, QuizError::InvalidMaxQuestions);
    }
}
