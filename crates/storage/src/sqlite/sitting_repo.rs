use quiz_core::model::{CourseId, QuizId, Sitting, SittingId, UserId};

use super::mapping::{id_i64, map_sitting_row, sitting_id_from_i64};
use super::SqliteRepository;
use crate::repository::{NewSitting, SittingRecord, SittingRepository, StorageError};

fn conn_err(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn join_order(new: &NewSitting) -> String {
    new.question_order
        .iter()
        .map(|id| id.value().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait::async_trait]
impl SittingRepository for SqliteRepository {
    async fn create_sitting(&self, new: &NewSitting) -> Result<Sitting, StorageError> {
        let order = join_order(new);

        // The partial unique index on incomplete sittings turns a duplicate
        // insert into a constraint violation, reported as Conflict.
        let res = sqlx::query(
            r"
            INSERT INTO sittings (
                user_id, quiz_id, course_id,
                question_order, remaining, incorrect, answers,
                score, complete, started_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, '', '{}', 0, 0, ?6, 0)
            ",
        )
        .bind(id_i64("user_id", new.user_id.value())?)
        .bind(id_i64("quiz_id", new.quiz_id.value())?)
        .bind(id_i64("course_id", new.course_id.value())?)
        .bind(order.as_str())
        .bind(order.as_str())
        .bind(new.started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            _ => conn_err(e),
        })?;

        let id = sitting_id_from_i64(res.last_insert_rowid())?;
        Sitting::new(
            id,
            new.user_id,
            new.quiz_id,
            new.course_id,
            new.question_order.clone(),
            new.started_at,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn get_sitting(&self, id: SittingId) -> Result<Option<Sitting>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                id, user_id, quiz_id, course_id,
                question_order, remaining, incorrect, answers,
                score, complete, started_at, ended_at, approved_at,
                certificate_code, version
            FROM sittings
            WHERE id = ?1
            ",
        )
        .bind(id_i64("sitting_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.map(|row| map_sitting_row(&row)?.into_sitting()).transpose()
    }

    async fn find_incomplete(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
    ) -> Result<Option<Sitting>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                id, user_id, quiz_id, course_id,
                question_order, remaining, incorrect, answers,
                score, complete, started_at, ended_at, approved_at,
                certificate_code, version
            FROM sittings
            WHERE user_id = ?1 AND quiz_id = ?2 AND course_id = ?3 AND complete = 0
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("quiz_id", quiz_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        row.map(|row| map_sitting_row(&row)?.into_sitting()).transpose()
    }

    async fn completed_sittings(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
        course_id: CourseId,
    ) -> Result<Vec<Sitting>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, user_id, quiz_id, course_id,
                question_order, remaining, incorrect, answers,
                score, complete, started_at, ended_at, approved_at,
                certificate_code, version
            FROM sittings
            WHERE user_id = ?1 AND quiz_id = ?2 AND course_id = ?3 AND complete = 1
            ORDER BY ended_at DESC, id DESC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("quiz_id", quiz_id.value())?)
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_sitting_row(&row)?.into_sitting()?);
        }
        Ok(out)
    }

    async fn update_sitting(
        &self,
        sitting: &Sitting,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let record = SittingRecord::from_sitting(sitting)?;

        let res = sqlx::query(
            r"
            UPDATE sittings SET
                remaining = ?1,
                incorrect = ?2,
                answers = ?3,
                score = ?4,
                complete = ?5,
                ended_at = ?6,
                approved_at = ?7,
                certificate_code = ?8,
                version = ?9
            WHERE id = ?10 AND version = ?11
            ",
        )
        .bind(record.remaining.as_str())
        .bind(record.incorrect.as_str())
        .bind(record.answers.as_str())
        .bind(i64::from(record.score))
        .bind(i64::from(record.complete))
        .bind(record.ended_at)
        .bind(record.approved_at)
        .bind(record.certificate_code.as_deref())
        .bind(id_i64("version", record.version)?)
        .bind(id_i64("sitting_id", record.id.value())?)
        .bind(id_i64("version", expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        if res.rows_affected() == 0 {
            // distinguish a lost race from a deleted sitting
            let exists = sqlx::query("SELECT 1 FROM sittings WHERE id = ?1")
                .bind(id_i64("sitting_id", record.id.value())?)
                .fetch_optional(&self.pool)
                .await
                .map_err(conn_err)?;
            return Err(if exists.is_some() {
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }

        Ok(())
    }

    async fn delete_sitting(&self, id: SittingId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM sittings WHERE id = ?1")
            .bind(id_i64("sitting_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
