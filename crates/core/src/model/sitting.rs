use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

use crate::model::certificate::CertificateCode;
use crate::model::ids::{CourseId, QuestionId, QuizId, SittingId, UserId};
use crate::model::question::Question;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SittingError {
    #[error("sitting needs at least one question")]
    NoQuestions,

    #[error("sitting is already complete")]
    Completed,

    #[error("question {0} was already answered in this sitting")]
    AlreadyAnswered(QuestionId),

    #[error("question {0} is not the current question")]
    NotCurrentQuestion(QuestionId),

    #[error("cannot finalize: {0} questions remain")]
    QuestionsRemaining(usize),

    #[error("remaining queue contains question {0} outside the sitting order")]
    UnknownQueuedQuestion(QuestionId),

    #[error("score {score} exceeds answered count {answered}")]
    ScoreOutOfRange { score: u32, answered: usize },

    #[error("ended_at is before started_at")]
    InvalidTimeRange,

    #[error("approval recorded on an incomplete sitting")]
    ApprovalWithoutCompletion,
}

//
// ─── PASS PREDICATE ────────────────────────────────────────────────────────────
//

/// The pass/fail rule: complete and at or above the pass mark.
///
/// Every consumer (finalize, retake gating, reporting) goes through this
/// one function so the verdict can never drift between code paths.
#[must_use]
pub fn passed(complete: bool, percent_correct: u8, pass_mark: u8) -> bool {
    complete && percent_correct >= pass_mark
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Result of scoring one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub question_id: QuestionId,
    /// `Some(true)` correct, `Some(false)` incorrect, `None` not auto-scored.
    pub correct: Option<bool>,
}

/// Result of finalizing a sitting, surfaced to the caller even when the
/// sitting record itself is discarded afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub score: u32,
    pub max_score: u32,
    pub percent_correct: u8,
    pub passed: bool,
    pub certificate_code: Option<CertificateCode>,
}

//
// ─── SITTING ───────────────────────────────────────────────────────────────────
//

/// One user's attempt at one quiz within one course.
///
/// The attempt steps through `question_order` front to back; `remaining`
/// shrinks as answers arrive and an empty queue means the sitting is ready
/// to finalize. The version counter increments on every mutation and backs
/// the storage layer's compare-and-swap update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sitting {
    id: SittingId,
    user_id: UserId,
    quiz_id: QuizId,
    course_id: CourseId,
    question_order: Vec<QuestionId>,
    remaining: VecDeque<QuestionId>,
    incorrect: Vec<QuestionId>,
    answers: BTreeMap<QuestionId, String>,
    score: u32,
    complete: bool,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    certificate_code: Option<CertificateCode>,
    version: u64,
}

impl Sitting {
    /// Starts a fresh sitting over the given question order.
    ///
    /// # Errors
    ///
    /// Returns `SittingError::NoQuestions` for an empty order.
    pub fn new(
        id: SittingId,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
        question_order: Vec<QuestionId>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SittingError> {
        if question_order.is_empty() {
            return Err(SittingError::NoQuestions);
        }
        let remaining = question_order.iter().copied().collect();
        Ok(Self {
            id,
            user_id,
            quiz_id,
            course_id,
            question_order,
            remaining,
            incorrect: Vec::new(),
            answers: BTreeMap::new(),
            score: 0,
            complete: false,
            started_at,
            ended_at: None,
            approved_at: None,
            certificate_code: None,
            version: 0,
        })
    }

    /// Rehydrates a sitting from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns a `SittingError` when the persisted fields contradict each
    /// other (queued question outside the order, score above the answered
    /// count, completion/approval inconsistencies, reversed timestamps).
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SittingId,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
        question_order: Vec<QuestionId>,
        remaining: VecDeque<QuestionId>,
        incorrect: Vec<QuestionId>,
        answers: BTreeMap<QuestionId, String>,
        score: u32,
        complete: bool,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        approved_at: Option<DateTime<Utc>>,
        certificate_code: Option<CertificateCode>,
        version: u64,
    ) -> Result<Self, SittingError> {
        if question_order.is_empty() {
            return Err(SittingError::NoQuestions);
        }
        for qid in &remaining {
            if !question_order.contains(qid) {
                return Err(SittingError::UnknownQueuedQuestion(*qid));
            }
        }
        let answered = question_order.len().saturating_sub(remaining.len());
        if score as usize > answered {
            return Err(SittingError::ScoreOutOfRange { score, answered });
        }
        if complete && !remaining.is_empty() {
            return Err(SittingError::QuestionsRemaining(remaining.len()));
        }
        if let Some(ended) = ended_at {
            if ended < started_at {
                return Err(SittingError::InvalidTimeRange);
            }
        }
        if (approved_at.is_some() || certificate_code.is_some()) && !complete {
            return Err(SittingError::ApprovalWithoutCompletion);
        }

        Ok(Self {
            id,
            user_id,
            quiz_id,
            course_id,
            question_order,
            remaining,
            incorrect,
            answers,
            score,
            complete,
            started_at,
            ended_at,
            approved_at,
            certificate_code,
            version,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> SittingId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn question_order(&self) -> &[QuestionId] {
        &self.question_order
    }

    #[must_use]
    pub fn remaining(&self) -> &VecDeque<QuestionId> {
        &self.remaining
    }

    #[must_use]
    pub fn incorrect_questions(&self) -> &[QuestionId] {
        &self.incorrect
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, String> {
        &self.answers
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    #[must_use]
    pub fn certificate_code(&self) -> Option<&CertificateCode> {
        self.certificate_code.as_ref()
    }

    /// Mutation counter backing the storage compare-and-swap.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Total number of questions in this sitting.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn max_score(&self) -> u32 {
        self.question_order.len() as u32
    }

    /// Number of questions answered so far.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.question_order.len() - self.remaining.len()
    }

    /// Question at the head of the queue; `None` means ready to finalize.
    #[must_use]
    pub fn current_question(&self) -> Option<QuestionId> {
        self.remaining.front().copied()
    }

    /// Score as a rounded percentage of the question count.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percent_correct(&self) -> u8 {
        let total = self.question_order.len();
        let percent = f64::from(self.score) / total as f64 * 100.0;
        percent.round() as u8
    }

    /// The single pass/fail verdict for this sitting.
    #[must_use]
    pub fn check_if_passed(&self, pass_mark: u8) -> bool {
        passed(self.complete, self.percent_correct(), pass_mark)
    }

    /// Scores `answer` against `question` and advances the queue.
    ///
    /// The question must be the current head and must not have been
    /// answered before; each question scores at most once per sitting.
    ///
    /// # Errors
    ///
    /// Returns `SittingError::Completed` on a finalized sitting,
    /// `SittingError::AlreadyAnswered` on a repeat submission, and
    /// `SittingError::NotCurrentQuestion` when `question` is not at the
    /// head of the queue.
    pub fn record_answer(
        &mut self,
        question: &Question,
        answer: &str,
    ) -> Result<AnswerOutcome, SittingError> {
        if self.complete {
            return Err(SittingError::Completed);
        }
        if self.answers.contains_key(&question.id()) {
            return Err(SittingError::AlreadyAnswered(question.id()));
        }
        match self.current_question() {
            Some(current) if current == question.id() => {}
            _ => return Err(SittingError::NotCurrentQuestion(question.id())),
        }

        let correct = question.score(answer);
        match correct {
            Some(true) => self.score += 1,
            Some(false) => self.incorrect.push(question.id()),
            None => {}
        }
        self.answers.insert(question.id(), answer.to_owned());
        self.remaining.pop_front();
        self.version += 1;

        Ok(AnswerOutcome {
            question_id: question.id(),
            correct,
        })
    }

    /// Completes the sitting and freezes its score.
    ///
    /// On the first call with a passing score, `candidate_code` becomes the
    /// sitting's certificate code and the approval timestamp is stamped.
    /// Subsequent calls are no-ops that return the original outcome; the
    /// code and timestamps never change once assigned, so a retry after a
    /// crash between scoring and persisting is safe.
    ///
    /// # Errors
    ///
    /// Returns `SittingError::QuestionsRemaining` while the queue is
    /// non-empty.
    pub fn finalize(
        &mut self,
        pass_mark: u8,
        now: DateTime<Utc>,
        candidate_code: CertificateCode,
    ) -> Result<FinalizeOutcome, SittingError> {
        if !self.remaining.is_empty() {
            return Err(SittingError::QuestionsRemaining(self.remaining.len()));
        }

        if !self.complete {
            self.complete = true;
            self.ended_at = Some(now);
            if passed(true, self.percent_correct(), pass_mark) {
                self.approved_at = Some(now);
                self.certificate_code = Some(candidate_code);
            }
            self.version += 1;
        }

        Ok(FinalizeOutcome {
            score: self.score,
            max_score: self.max_score(),
            percent_correct: self.percent_correct(),
            passed: self.check_if_passed(pass_mark),
            certificate_code: self.certificate_code.clone(),
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::{Category, Choice};
    use crate::time::fixed_now;

    fn mc(id: u64, correct_choice: u32) -> Question {
        Question::multiple_choice(
            QuestionId::new(id),
            format!("Question {id}"),
            Some(Category::new("Safety").unwrap()),
            vec![
                Choice::new(1, "A", correct_choice == 1),
                Choice::new(2, "B", correct_choice == 2),
            ],
        )
        .unwrap()
    }

    fn sitting(order: &[u64]) -> Sitting {
        Sitting::new(
            SittingId::new(1),
            UserId::new(10),
            QuizId::new(20),
            CourseId::new(30),
            order.iter().copied().map(QuestionId::new).collect(),
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn empty_order_is_rejected() {
        let err = Sitting::new(
            SittingId::new(1),
            UserId::new(1),
            QuizId::new(1),
            CourseId::new(1),
            Vec::new(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, SittingError::NoQuestions);
    }

    #[test]
    fn answered_question_never_comes_back() {
        let mut sitting = sitting(&[1, 2]);
        let q1 = mc(1, 2);

        assert_eq!(sitting.current_question(), Some(QuestionId::new(1)));
        sitting.record_answer(&q1, "2").unwrap();
        assert_eq!(sitting.current_question(), Some(QuestionId::new(2)));
        assert_ne!(sitting.current_question(), Some(QuestionId::new(1)));
    }

    #[test]
    fn double_answer_is_rejected_and_score_unchanged() {
        let mut sitting = sitting(&[1, 2]);
        let q1 = mc(1, 2);

        sitting.record_answer(&q1, "2").unwrap();
        assert_eq!(sitting.score(), 1);

        let err = sitting.record_answer(&q1, "2").unwrap_err();
        assert_eq!(err, SittingError::AlreadyAnswered(QuestionId::new(1)));
        assert_eq!(sitting.score(), 1);
    }

    #[test]
    fn out_of_order_answer_is_rejected() {
        let mut sitting = sitting(&[1, 2]);
        let q2 = mc(2, 1);

        let err = sitting.record_answer(&q2, "1").unwrap_err();
        assert_eq!(err, SittingError::NotCurrentQuestion(QuestionId::new(2)));
    }

    #[test]
    fn incorrect_answers_land_in_the_incorrect_set() {
        let mut sitting = sitting(&[1]);
        let q1 = mc(1, 2);

        let outcome = sitting.record_answer(&q1, "1").unwrap();
        assert_eq!(outcome.correct, Some(false));
        assert_eq!(sitting.incorrect_questions(), &[QuestionId::new(1)]);
        assert_eq!(sitting.score(), 0);
    }

    #[test]
    fn essay_counts_as_answered_but_not_incorrect() {
        let mut sitting = sitting(&[1]);
        let essay = Question::essay(QuestionId::new(1), "Explain", None).unwrap();

        let outcome = sitting.record_answer(&essay, "my answer").unwrap();
        assert_eq!(outcome.correct, None);
        assert!(sitting.incorrect_questions().is_empty());
        assert_eq!(sitting.score(), 0);
        assert_eq!(sitting.answered_count(), 1);
    }

    #[test]
    fn three_of_four_correct_passes_at_75() {
        let mut sitting = sitting(&[1, 2, 3, 4]);
        sitting.record_answer(&mc(1, 2), "2").unwrap();
        sitting.record_answer(&mc(2, 2), "2").unwrap();
        sitting.record_answer(&mc(3, 2), "2").unwrap();
        sitting.record_answer(&mc(4, 2), "1").unwrap();

        let outcome = sitting
            .finalize(75, fixed_now(), CertificateCode::generate())
            .unwrap();
        assert_eq!(outcome.percent_correct, 75);
        assert!(outcome.passed);
        assert!(outcome.certificate_code.is_some());
        assert!(sitting.approved_at().is_some());
    }

    #[test]
    fn two_of_four_correct_fails_at_75_without_code() {
        let mut sitting = sitting(&[1, 2, 3, 4]);
        sitting.record_answer(&mc(1, 2), "2").unwrap();
        sitting.record_answer(&mc(2, 2), "2").unwrap();
        sitting.record_answer(&mc(3, 2), "1").unwrap();
        sitting.record_answer(&mc(4, 2), "1").unwrap();

        let outcome = sitting
            .finalize(75, fixed_now(), CertificateCode::generate())
            .unwrap();
        assert_eq!(outcome.percent_correct, 50);
        assert!(!outcome.passed);
        assert!(outcome.certificate_code.is_none());
        assert!(sitting.approved_at().is_none());
        assert!(sitting.certificate_code().is_none());
    }

    #[test]
    fn finalize_rejects_nonempty_queue() {
        let mut sitting = sitting(&[1, 2]);
        sitting.record_answer(&mc(1, 2), "2").unwrap();

        let err = sitting
            .finalize(75, fixed_now(), CertificateCode::generate())
            .unwrap_err();
        assert_eq!(err, SittingError::QuestionsRemaining(1));
    }

    #[test]
    fn finalize_is_idempotent_and_code_is_stable() {
        let mut sitting = sitting(&[1]);
        sitting.record_answer(&mc(1, 2), "2").unwrap();

        let first = sitting
            .finalize(50, fixed_now(), CertificateCode::generate())
            .unwrap();
        let second = sitting
            .finalize(50, fixed_now() + chrono::Duration::hours(1), CertificateCode::generate())
            .unwrap();

        assert_eq!(first.certificate_code, second.certificate_code);
        assert_eq!(first.percent_correct, second.percent_correct);
        assert_eq!(sitting.ended_at(), Some(fixed_now()));
    }

    #[test]
    fn submitting_to_a_finalized_sitting_fails() {
        let mut sitting = sitting(&[1]);
        sitting.record_answer(&mc(1, 2), "2").unwrap();
        sitting
            .finalize(50, fixed_now(), CertificateCode::generate())
            .unwrap();

        let err = sitting.record_answer(&mc(1, 2), "2").unwrap_err();
        assert_eq!(err, SittingError::Completed);
    }

    #[test]
    fn version_bumps_on_every_mutation() {
        let mut sitting = sitting(&[1]);
        assert_eq!(sitting.version(), 0);
        sitting.record_answer(&mc(1, 2), "2").unwrap();
        assert_eq!(sitting.version(), 1);
        sitting
            .finalize(50, fixed_now(), CertificateCode::generate())
            .unwrap();
        assert_eq!(sitting.version(), 2);
        // idempotent finalize does not mutate
        sitting
            .finalize(50, fixed_now(), CertificateCode::generate())
            .unwrap();
        assert_eq!(sitting.version(), 2);
    }

    #[test]
    fn from_persisted_rejects_inconsistent_state() {
        let order: Vec<_> = [1, 2].into_iter().map(QuestionId::new).collect();

        let err = Sitting::from_persisted(
            SittingId::new(1),
            UserId::new(1),
            QuizId::new(1),
            CourseId::new(1),
            order.clone(),
            [QuestionId::new(9)].into_iter().collect(),
            Vec::new(),
            BTreeMap::new(),
            0,
            false,
            fixed_now(),
            None,
            None,
            None,
            0,
        )
        .unwrap_err();
        assert_eq!(err, SittingError::UnknownQueuedQuestion(QuestionId::new(9)));

        let err = Sitting::from_persisted(
            SittingId::new(1),
            UserId::new(1),
            QuizId::new(1),
            CourseId::new(1),
            order.clone(),
            VecDeque::new(),
            Vec::new(),
            BTreeMap::new(),
            5,
            true,
            fixed_now(),
            Some(fixed_now()),
            None,
            None,
            0,
        )
        .unwrap_err();
        assert_eq!(err, SittingError::ScoreOutOfRange { score: 5, answered: 2 });

        let err = Sitting::from_persisted(
            SittingId::new(1),
            UserId::new(1),
            QuizId::new(1),
            CourseId::new(1),
            order,
            VecDeque::new(),
            Vec::new(),
            BTreeMap::new(),
            2,
            false,
            fixed_now(),
            None,
            Some(fixed_now()),
            None,
            0,
        )
        .unwrap_err();
        assert_eq!(err, SittingError::ApprovalWithoutCompletion);
    }

    #[test]
    fn pass_predicate_requires_completion() {
        assert!(!passed(false, 100, 75));
        assert!(passed(true, 75, 75));
        assert!(!passed(true, 74, 75));
    }
}
