use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (quizzes with their ordered question sets,
/// questions with choices, sittings, progress tallies, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quizzes (
                    id INTEGER PRIMARY KEY,
                    course_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    pass_mark INTEGER NOT NULL CHECK (pass_mark BETWEEN 0 AND 100),
                    max_questions INTEGER CHECK (max_questions IS NULL OR max_questions > 0),
                    randomize_order INTEGER NOT NULL DEFAULT 0,
                    answers_at_end INTEGER NOT NULL DEFAULT 0,
                    single_attempt INTEGER NOT NULL DEFAULT 0,
                    exam_paper INTEGER NOT NULL DEFAULT 0,
                    draft INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    prompt TEXT NOT NULL,
                    category TEXT,
                    kind TEXT NOT NULL CHECK (kind IN ('multiple_choice', 'essay'))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_choices (
                    question_id INTEGER NOT NULL,
                    choice_id INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    correct INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (question_id, choice_id),
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_questions (
                    quiz_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    PRIMARY KEY (quiz_id, question_id),
                    FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sittings (
                    id INTEGER PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    quiz_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    question_order TEXT NOT NULL,
                    remaining TEXT NOT NULL,
                    incorrect TEXT NOT NULL,
                    answers TEXT NOT NULL,
                    score INTEGER NOT NULL CHECK (score >= 0),
                    complete INTEGER NOT NULL DEFAULT 0,
                    started_at TEXT NOT NULL,
                    ended_at TEXT,
                    approved_at TEXT,
                    certificate_code TEXT,
                    version INTEGER NOT NULL DEFAULT 0,
                    FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress (
                    user_id INTEGER NOT NULL,
                    category TEXT NOT NULL,
                    correct INTEGER NOT NULL CHECK (correct >= 0),
                    total INTEGER NOT NULL CHECK (total >= 0),
                    PRIMARY KEY (user_id, category)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // one incomplete sitting per (user, quiz, course)
        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_sittings_one_incomplete
                    ON sittings (user_id, quiz_id, course_id)
                    WHERE complete = 0;
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sittings_user_quiz_course
                    ON sittings (user_id, quiz_id, course_id, complete);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sittings_ended_at
                    ON sittings (ended_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
