use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{
    AnswerOutcome, CertificateCode, CourseId, FinalizeOutcome, Progress, Question, QuestionId,
    Quiz, QuizId, Sitting, UserId,
};
use storage::repository::{
    NewSitting, ProgressRepository, QuizRepository, SittingRepository, StorageError,
};

use super::order::OrderBuilder;
use crate::error::QuizTakeError;
use crate::reports::cache::{REPORT_CACHE_PREFIX, ReportCache};

//
// ─── ACTOR ─────────────────────────────────────────────────────────────────────
//

/// Who is driving the workflow; decides whether finalized sittings persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Student,
    Lecturer,
    Admin,
}

impl Actor {
    /// Privileged actors' sittings are always ephemeral (trial runs, not
    /// certificate material).
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        matches!(self, Actor::Lecturer | Actor::Admin)
    }
}

//
// ─── WORKFLOW ──────────────────────────────────────────────────────────────────
//

/// Orchestrates sitting creation, answering, and finalization.
///
/// Every mutation of a sitting persists through the repository's
/// compare-and-swap update, so two concurrent requests against the same
/// sitting serialize: one commits, the other observes a conflict.
#[derive(Clone)]
pub struct QuizTakeService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    sittings: Arc<dyn SittingRepository>,
    progress: Arc<dyn ProgressRepository>,
    report_cache: Option<Arc<dyn ReportCache>>,
}

impl QuizTakeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        sittings: Arc<dyn SittingRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            sittings,
            progress,
            report_cache: None,
        }
    }

    /// Attach a report cache to invalidate when sittings finalize or die.
    #[must_use]
    pub fn with_report_cache(mut self, cache: Arc<dyn ReportCache>) -> Self {
        self.report_cache = Some(cache);
        self
    }

    async fn load_quiz(&self, quiz_id: QuizId) -> Result<Quiz, QuizTakeError> {
        self.quizzes
            .get_quiz(quiz_id)
            .await?
            .ok_or(QuizTakeError::NotFound("quiz"))
    }

    /// Start (or resume) a sitting for the given user, quiz, and course.
    ///
    /// Returns the existing incomplete sitting when one exists, so repeated
    /// calls are idempotent. Retake policy: a completed passing attempt
    /// always blocks; with `single_attempt` set, any completed attempt
    /// blocks; otherwise a failed completion permits a fresh sitting.
    ///
    /// # Errors
    ///
    /// Returns `QuizTakeError::NotFound` for a missing or draft quiz,
    /// `QuizTakeError::EmptyQuiz` for a quiz without questions, and
    /// `QuizTakeError::AlreadyCompleted` when policy forbids a retake.
    pub async fn start_sitting(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
    ) -> Result<Sitting, QuizTakeError> {
        let quiz = self.load_quiz(quiz_id).await?;
        if quiz.flags().draft {
            return Err(QuizTakeError::NotFound("quiz"));
        }
        if quiz.is_empty() {
            return Err(QuizTakeError::EmptyQuiz);
        }

        if let Some(existing) = self
            .sittings
            .find_incomplete(user_id, quiz_id, course_id)
            .await?
        {
            return Ok(existing);
        }

        let completed = self
            .sittings
            .completed_sittings(user_id, quiz_id, course_id)
            .await?;
        let has_pass = completed
            .iter()
            .any(|s| s.check_if_passed(quiz.pass_mark()));
        if has_pass || (quiz.flags().single_attempt && !completed.is_empty()) {
            return Err(QuizTakeError::AlreadyCompleted);
        }

        let new = NewSitting {
            user_id,
            quiz_id,
            course_id,
            question_order: OrderBuilder::new(&quiz).build(),
            started_at: self.clock.now(),
        };
        match self.sittings.create_sitting(&new).await {
            Ok(sitting) => Ok(sitting),
            // lost a creation race; the other request's sitting is ours too
            Err(StorageError::Conflict) => self
                .sittings
                .find_incomplete(user_id, quiz_id, course_id)
                .await?
                .ok_or(QuizTakeError::ConcurrentModification),
            Err(e) => Err(e.into()),
        }
    }

    /// The question at the head of the sitting's queue, `None` when the
    /// sitting is ready to finalize.
    ///
    /// # Errors
    ///
    /// Returns `QuizTakeError::NotFound` when the queued question no longer
    /// exists.
    pub async fn current_question(
        &self,
        sitting: &Sitting,
    ) -> Result<Option<Question>, QuizTakeError> {
        let Some(question_id) = sitting.current_question() else {
            return Ok(None);
        };
        let question = self.fetch_question(question_id).await?;
        Ok(Some(question))
    }

    async fn fetch_question(&self, question_id: QuestionId) -> Result<Question, QuizTakeError> {
        let mut questions = self
            .quizzes
            .get_questions(&[question_id])
            .await
            .map_err(|e| match e {
                StorageError::NotFound => QuizTakeError::NotFound("question"),
                other => other.into(),
            })?;
        questions.pop().ok_or(QuizTakeError::NotFound("question"))
    }

    /// Score an answer to the sitting's current question and persist.
    ///
    /// The compare-and-swap write means a concurrent submission to the same
    /// sitting surfaces as `ConcurrentModification` instead of silently
    /// double-scoring. Progress tallies are updated after the sitting
    /// commits.
    ///
    /// # Errors
    ///
    /// Returns `QuizTakeError::InvalidState` for double or out-of-order
    /// submissions, `QuizTakeError::NotFound` for an unknown question, and
    /// `QuizTakeError::ConcurrentModification` on a lost write race.
    pub async fn submit_answer(
        &self,
        sitting: &mut Sitting,
        question_id: QuestionId,
        answer: &str,
    ) -> Result<AnswerOutcome, QuizTakeError> {
        let question = self.fetch_question(question_id).await?;

        let expected = sitting.version();
        let outcome = sitting.record_answer(&question, answer)?;
        self.sittings.update_sitting(sitting, expected).await?;

        if let Some(category) = question.category() {
            let mut progress = self
                .progress
                .load_progress(sitting.user_id())
                .await?
                .unwrap_or_else(|| Progress::new(sitting.user_id()));
            progress.record(category.clone(), outcome.correct == Some(true));
            self.progress.save_progress(&progress).await?;
        }

        Ok(outcome)
    }

    /// Finalize a sitting: freeze the score, stamp approval, assign the
    /// certificate code, and discard ephemeral attempts.
    ///
    /// Safe to re-enter: if a previous call crashed between scoring and
    /// persisting, the retry converges on the stored outcome and the
    /// certificate code never changes once assigned.
    ///
    /// # Errors
    ///
    /// Returns `QuizTakeError::InvalidState` while questions remain and
    /// `QuizTakeError::NotFound` when the quiz has vanished.
    pub async fn finalize(
        &self,
        sitting: &mut Sitting,
        actor: Actor,
    ) -> Result<FinalizeOutcome, QuizTakeError> {
        let quiz = self.load_quiz(sitting.quiz_id()).await?;

        let expected = sitting.version();
        let mut outcome =
            sitting.finalize(quiz.pass_mark(), self.clock.now(), CertificateCode::generate())?;

        if sitting.version() != expected {
            match self.sittings.update_sitting(sitting, expected).await {
                Ok(()) => {}
                Err(StorageError::Conflict) => {
                    // another finalize won the race; adopt its result
                    let stored = self
                        .sittings
                        .get_sitting(sitting.id())
                        .await?
                        .ok_or(QuizTakeError::ConcurrentModification)?;
                    if !stored.is_complete() {
                        return Err(QuizTakeError::ConcurrentModification);
                    }
                    outcome = outcome_of(&stored, &quiz);
                    *sitting = stored;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(
            sitting = %sitting.id(),
            quiz = %quiz.id(),
            percent = outcome.percent_correct,
            passed = outcome.passed,
            "sitting finalized"
        );

        // ephemeral attempts are discarded; only exam-paper sittings from
        // students feed certificates and reports
        if !quiz.flags().exam_paper || actor.is_privileged() {
            match self.sittings.delete_sitting(sitting.id()).await {
                Ok(()) | Err(StorageError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(cache) = &self.report_cache {
            cache.invalidate(REPORT_CACHE_PREFIX);
            tracing::debug!(sitting = %sitting.id(), "report cache invalidated");
        }

        Ok(outcome)
    }
}

fn outcome_of(sitting: &Sitting, quiz: &Quiz) -> FinalizeOutcome {
    FinalizeOutcome {
        score: sitting.score(),
        max_score: sitting.max_score(),
        percent_correct: sitting.percent_correct(),
        passed: sitting.check_if_passed(quiz.pass_mark()),
        certificate_code: sitting.certificate_code().cloned(),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
