use std::collections::BTreeMap;

use quiz_core::model::{Category, CategoryScore, Progress, UserId};
use sqlx::Row;

use super::mapping::{id_i64, ser, u32_from_i64};
use super::SqliteRepository;
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_progress(&self, user_id: UserId) -> Result<Option<Progress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT category, correct, total
            FROM progress
            WHERE user_id = ?1
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut scores = BTreeMap::new();
        for row in rows {
            let category =
                Category::new(row.try_get::<String, _>("category").map_err(ser)?).map_err(ser)?;
            let score = CategoryScore {
                correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
                total: u32_from_i64("total", row.try_get::<i64, _>("total").map_err(ser)?)?,
            };
            scores.insert(category, score);
        }

        Ok(Some(Progress::from_persisted(user_id, scores)))
    }

    async fn save_progress(&self, progress: &Progress) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (category, score) in progress.scores() {
            sqlx::query(
                r"
                INSERT INTO progress (user_id, category, correct, total)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(user_id, category) DO UPDATE SET
                    correct = excluded.correct,
                    total = excluded.total
                ",
            )
            .bind(id_i64("user_id", progress.user_id().value())?)
            .bind(category.as_str())
            .bind(i64::from(score.correct))
            .bind(i64::from(score.total))
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
