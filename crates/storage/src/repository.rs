use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    CertificateCode, CourseId, Progress, Question, QuestionId, Quiz, QuizId, Sitting, SittingError,
    SittingId, UserId,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A compare-and-swap update lost the race, or an insert would break a
    /// uniqueness invariant.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Input for creating a sitting; the repository assigns the id.
#[derive(Debug, Clone)]
pub struct NewSitting {
    pub user_id: UserId,
    pub quiz_id: QuizId,
    pub course_id: CourseId,
    pub question_order: Vec<QuestionId>,
    pub started_at: DateTime<Utc>,
}

//
// ─── SITTING RECORD ────────────────────────────────────────────────────────────
//

/// Persisted shape of a sitting.
///
/// Question lists are stored as comma-joined id strings and the answers map
/// as JSON, so repositories can serialize without leaking storage concerns
/// into the domain layer.
#[derive(Debug, Clone)]
pub struct SittingRecord {
    pub id: SittingId,
    pub user_id: UserId,
    pub quiz_id: QuizId,
    pub course_id: CourseId,
    pub question_order: String,
    pub remaining: String,
    pub incorrect: String,
    pub answers: String,
    pub score: u32,
    pub complete: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub certificate_code: Option<String>,
    pub version: u64,
}

fn join_ids(ids: impl IntoIterator<Item = QuestionId>) -> String {
    ids.into_iter()
        .map(|id| id.value().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn split_ids(field: &'static str, raw: &str) -> Result<Vec<QuestionId>, StorageError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|part| {
            part.parse::<u64>()
                .map(QuestionId::new)
                .map_err(|_| StorageError::Serialization(format!("invalid {field} entry: {part}")))
        })
        .collect()
}

impl SittingRecord {
    /// Builds a record from a domain sitting.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the answers map cannot be
    /// encoded as JSON.
    pub fn from_sitting(sitting: &Sitting) -> Result<Self, StorageError> {
        let answers: BTreeMap<String, &str> = sitting
            .answers()
            .iter()
            .map(|(qid, answer)| (qid.value().to_string(), answer.as_str()))
            .collect();
        let answers = serde_json::to_string(&answers)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Self {
            id: sitting.id(),
            user_id: sitting.user_id(),
            quiz_id: sitting.quiz_id(),
            course_id: sitting.course_id(),
            question_order: join_ids(sitting.question_order().iter().copied()),
            remaining: join_ids(sitting.remaining().iter().copied()),
            incorrect: join_ids(sitting.incorrect_questions().iter().copied()),
            answers,
            score: sitting.score(),
            complete: sitting.is_complete(),
            started_at: sitting.started_at(),
            ended_at: sitting.ended_at(),
            approved_at: sitting.approved_at(),
            certificate_code: sitting.certificate_code().map(|c| c.as_str().to_owned()),
            version: sitting.version(),
        })
    }

    /// Converts the record back into a domain sitting.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` when a field fails to parse or
    /// the rehydrated state fails the domain invariant checks.
    pub fn into_sitting(self) -> Result<Sitting, StorageError> {
        let question_order = split_ids("question_order", &self.question_order)?;
        let remaining: VecDeque<QuestionId> =
            split_ids("remaining", &self.remaining)?.into_iter().collect();
        let incorrect = split_ids("incorrect", &self.incorrect)?;

        let raw_answers: BTreeMap<String, String> = serde_json::from_str(&self.answers)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut answers = BTreeMap::new();
        for (key, value) in raw_answers {
            let qid = key.parse::<u64>().map(QuestionId::new).map_err(|_| {
                StorageError::Serialization(format!("invalid answer question id: {key}"))
            })?;
            answers.insert(qid, value);
        }

        let certificate_code = self
            .certificate_code
            .map(CertificateCode::from_persisted)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Sitting::from_persisted(
            self.id,
            self.user_id,
            self.quiz_id,
            self.course_id,
            question_order,
            remaining,
            incorrect,
            answers,
            self.score,
            self.complete,
            self.started_at,
            self.ended_at,
            self.approved_at,
            certificate_code,
            self.version,
        )
        .map_err(|e: SittingError| StorageError::Serialization(e.to_string()))
    }
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Repository contract for quizzes and their questions.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist or update a quiz definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the quiz cannot be stored.
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// Fetch a quiz by id, `None` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError>;

    /// Persist or update a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Fetch questions by id, preserving the requested order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any id is missing.
    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError>;
}

/// Repository contract for sittings.
///
/// At most one incomplete sitting may exist per (user, quiz, course);
/// implementations enforce this on insert. All mutations of an existing
/// sitting go through the compare-and-swap `update_sitting` so concurrent
/// submissions serialize instead of interleaving.
#[async_trait]
pub trait SittingRepository: Send + Sync {
    /// Create a sitting, assigning its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when an incomplete sitting already
    /// exists for the same (user, quiz, course).
    async fn create_sitting(&self, new: &NewSitting) -> Result<Sitting, StorageError>;

    /// Fetch a sitting by id, `None` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_sitting(&self, id: SittingId) -> Result<Option<Sitting>, StorageError>;

    /// The at-most-one incomplete sitting for (user, quiz, course).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn find_incomplete(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
    ) -> Result<Option<Sitting>, StorageError>;

    /// All completed sittings for (user, quiz, course), newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn completed_sittings(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
    ) -> Result<Vec<Sitting>, StorageError>;

    /// Persist a mutated sitting if the stored version still matches
    /// `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the stored version differs
    /// (another writer got there first) and `StorageError::NotFound` when
    /// the sitting no longer exists.
    async fn update_sitting(
        &self,
        sitting: &Sitting,
        expected_version: u64,
    ) -> Result<(), StorageError>;

    /// Delete a sitting (ephemeral attempts after finalize).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the sitting does not exist.
    async fn delete_sitting(&self, id: SittingId) -> Result<(), StorageError>;
}

/// Repository contract for per-user progress tallies.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch a user's progress, `None` when none was recorded yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn load_progress(&self, user_id: UserId) -> Result<Option<Progress>, StorageError>;

    /// Persist a user's progress tallies.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the tallies cannot be stored.
    async fn save_progress(&self, progress: &Progress) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

/// Simple in-memory repository for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    quizzes: Arc<Mutex<HashMap<QuizId, Quiz>>>,
    questions: Arc<Mutex<HashMap<QuestionId, Question>>>,
    sittings: Arc<Mutex<HashMap<SittingId, Sitting>>>,
    progress: Arc<Mutex<HashMap<UserId, Progress>>>,
    next_sitting_id: Arc<Mutex<u64>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut guard = self.quizzes.lock().map_err(lock_err)?;
        guard.insert(quiz.id(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let guard = self.quizzes.lock().map_err(lock_err)?;
        Ok(guard.get(&id).cloned())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(lock_err)?;
        guard.insert(question.id(), question.clone());
        Ok(())
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match guard.get(id) {
                Some(question) => found.push(question.clone()),
                None => return Err(StorageError::NotFound),
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl SittingRepository for InMemoryRepository {
    async fn create_sitting(&self, new: &NewSitting) -> Result<Sitting, StorageError> {
        let mut guard = self.sittings.lock().map_err(lock_err)?;
        let duplicate = guard.values().any(|s| {
            !s.is_complete()
                && s.user_id() == new.user_id
                && s.quiz_id() == new.quiz_id
                && s.course_id() == new.course_id
        });
        if duplicate {
            return Err(StorageError::Conflict);
        }

        let mut next = self.next_sitting_id.lock().map_err(lock_err)?;
        *next += 1;
        let sitting = Sitting::new(
            SittingId::new(*next),
            new.user_id,
            new.quiz_id,
            new.course_id,
            new.question_order.clone(),
            new.started_at,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        guard.insert(sitting.id(), sitting.clone());
        Ok(sitting)
    }

    async fn get_sitting(&self, id: SittingId) -> Result<Option<Sitting>, StorageError> {
        let guard = self.sittings.lock().map_err(lock_err)?;
        Ok(guard.get(&id).cloned())
    }

    async fn find_incomplete(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
    ) -> Result<Option<Sitting>, StorageError> {
        let guard = self.sittings.lock().map_err(lock_err)?;
        Ok(guard
            .values()
            .find(|s| {
                !s.is_complete()
                    && s.user_id() == user_id
                    && s.quiz_id() == quiz_id
                    && s.course_id() == course_id
            })
            .cloned())
    }

    async fn completed_sittings(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
    ) -> Result<Vec<Sitting>, StorageError> {
        let guard = self.sittings.lock().map_err(lock_err)?;
        let mut completed: Vec<Sitting> = guard
            .values()
            .filter(|s| {
                s.is_complete()
                    && s.user_id() == user_id
                    && s.quiz_id() == quiz_id
                    && s.course_id() == course_id
            })
            .cloned()
            .collect();
        completed.sort_by_key(|s| std::cmp::Reverse((s.ended_at(), s.id().value())));
        Ok(completed)
    }

    async fn update_sitting(
        &self,
        sitting: &Sitting,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut guard = self.sittings.lock().map_err(lock_err)?;
        let stored = guard.get(&sitting.id()).ok_or(StorageError::NotFound)?;
        if stored.version() != expected_version {
            return Err(StorageError::Conflict);
        }
        guard.insert(sitting.id(), sitting.clone());
        Ok(())
    }

    async fn delete_sitting(&self, id: SittingId) -> Result<(), StorageError> {
        let mut guard = self.sittings.lock().map_err(lock_err)?;
        guard.remove(&id).map(|_| ()).ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(&self, user_id: UserId) -> Result<Option<Progress>, StorageError> {
        let guard = self.progress.lock().map_err(lock_err)?;
        Ok(guard.get(&user_id).cloned())
    }

    async fn save_progress(&self, progress: &Progress) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        guard.insert(progress.user_id(), progress.clone());
        Ok(())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Bundles the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub quizzes: Arc<dyn QuizRepository>,
    pub sittings: Arc<dyn SittingRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let sittings: Arc<dyn SittingRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self {
            quizzes,
            sittings,
            progress,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{Category, Choice, QuizFlags};
    use quiz_core::time::fixed_now;

    fn build_question(id: u64) -> Question {
        Question::multiple_choice(
            QuestionId::new(id),
            format!("Question {id}"),
            Some(Category::new("Safety").unwrap()),
            vec![Choice::new(1, "A", true), Choice::new(2, "B", false)],
        )
        .unwrap()
    }

    fn new_sitting(user: u64) -> NewSitting {
        NewSitting {
            user_id: UserId::new(user),
            quiz_id: QuizId::new(1),
            course_id: CourseId::new(1),
            question_order: vec![QuestionId::new(1), QuestionId::new(2)],
            started_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn quiz_roundtrip() {
        let repo = InMemoryRepository::new();
        let quiz = Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            "Safety induction",
            75,
            vec![QuestionId::new(1)],
            None,
            QuizFlags::default(),
            fixed_now(),
        )
        .unwrap();

        repo.upsert_quiz(&quiz).await.unwrap();
        let fetched = repo.get_quiz(quiz.id()).await.unwrap().unwrap();
        assert_eq!(fetched, quiz);
        assert!(repo.get_quiz(QuizId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_questions_preserves_order_and_errors_on_missing() {
        let repo = InMemoryRepository::new();
        repo.upsert_question(&build_question(1)).await.unwrap();
        repo.upsert_question(&build_question(2)).await.unwrap();

        let questions = repo
            .get_questions(&[QuestionId::new(2), QuestionId::new(1)])
            .await
            .unwrap();
        assert_eq!(questions[0].id(), QuestionId::new(2));
        assert_eq!(questions[1].id(), QuestionId::new(1));

        let err = repo.get_questions(&[QuestionId::new(9)]).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn second_incomplete_sitting_conflicts() {
        let repo = InMemoryRepository::new();
        repo.create_sitting(&new_sitting(1)).await.unwrap();

        let err = repo.create_sitting(&new_sitting(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        // a different user is fine
        repo.create_sitting(&new_sitting(2)).await.unwrap();
    }

    #[tokio::test]
    async fn update_sitting_rejects_stale_version() {
        let repo = InMemoryRepository::new();
        let sitting = repo.create_sitting(&new_sitting(1)).await.unwrap();

        let mut first = sitting.clone();
        let mut second = sitting.clone();
        let question = build_question(1);

        first.record_answer(&question, "1").unwrap();
        repo.update_sitting(&first, sitting.version()).await.unwrap();

        second.record_answer(&question, "2").unwrap();
        let err = repo
            .update_sitting(&second, sitting.version())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        // the winner's answer is the one on record
        let stored = repo.get_sitting(sitting.id()).await.unwrap().unwrap();
        assert_eq!(stored.score(), 1);
    }

    #[tokio::test]
    async fn sitting_record_roundtrip() {
        let repo = InMemoryRepository::new();
        let mut sitting = repo.create_sitting(&new_sitting(1)).await.unwrap();
        sitting.record_answer(&build_question(1), "1").unwrap();

        let record = SittingRecord::from_sitting(&sitting).unwrap();
        let restored = record.into_sitting().unwrap();
        assert_eq!(restored, sitting);
    }

    #[tokio::test]
    async fn progress_roundtrip() {
        let repo = InMemoryRepository::new();
        assert!(repo.load_progress(UserId::new(1)).await.unwrap().is_none());

        let mut progress = Progress::new(UserId::new(1));
        progress.record(Category::new("Safety").unwrap(), true);
        repo.save_progress(&progress).await.unwrap();

        let loaded = repo.load_progress(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(loaded, progress);
    }
}
