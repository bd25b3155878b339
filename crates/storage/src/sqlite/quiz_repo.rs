use std::collections::HashMap;

use quiz_core::model::{Question, QuestionId, Quiz, QuizFlags, QuizId, QuestionVariant};
use sqlx::Row;

use super::mapping::{
    KIND_ESSAY, KIND_MULTIPLE_CHOICE, build_question, course_id_from_i64, id_i64, map_choice_row,
    question_id_from_i64, ser, u8_from_i64, u32_from_i64,
};
use super::SqliteRepository;
use crate::repository::{QuizRepository, StorageError};

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO quizzes (
                id, course_id, title, pass_mark, max_questions,
                randomize_order, answers_at_end, single_attempt, exam_paper, draft,
                created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                -- keep created_at from the original insert
                course_id = excluded.course_id,
                title = excluded.title,
                pass_mark = excluded.pass_mark,
                max_questions = excluded.max_questions,
                randomize_order = excluded.randomize_order,
                answers_at_end = excluded.answers_at_end,
                single_attempt = excluded.single_attempt,
                exam_paper = excluded.exam_paper,
                draft = excluded.draft
            ",
        )
        .bind(id_i64("quiz_id", quiz.id().value())?)
        .bind(id_i64("course_id", quiz.course_id().value())?)
        .bind(quiz.title())
        .bind(i64::from(quiz.pass_mark()))
        .bind(quiz.max_questions().map(i64::from))
        .bind(i64::from(quiz.flags().randomize_order))
        .bind(i64::from(quiz.flags().answers_at_end))
        .bind(i64::from(quiz.flags().single_attempt))
        .bind(i64::from(quiz.flags().exam_paper))
        .bind(i64::from(quiz.flags().draft))
        .bind(quiz.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM quiz_questions WHERE quiz_id = ?1")
            .bind(id_i64("quiz_id", quiz.id().value())?)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (position, qid) in quiz.question_ids().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO quiz_questions (quiz_id, question_id, position)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(id_i64("quiz_id", quiz.id().value())?)
            .bind(id_i64("question_id", qid.value())?)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Option<Quiz>, StorageError> {
        let Some(row) = sqlx::query(
            r"
            SELECT
                id, course_id, title, pass_mark, max_questions,
                randomize_order, answers_at_end, single_attempt, exam_paper, draft,
                created_at
            FROM quizzes
            WHERE id = ?1
            ",
        )
        .bind(id_i64("quiz_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        else {
            return Ok(None);
        };

        let question_rows = sqlx::query(
            r"
            SELECT question_id
            FROM quiz_questions
            WHERE quiz_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(id_i64("quiz_id", id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut question_ids = Vec::with_capacity(question_rows.len());
        for qrow in question_rows {
            question_ids.push(question_id_from_i64(
                qrow.try_get::<i64, _>("question_id").map_err(ser)?,
            )?);
        }

        let flags = QuizFlags {
            randomize_order: row.try_get::<i64, _>("randomize_order").map_err(ser)? != 0,
            answers_at_end: row.try_get::<i64, _>("answers_at_end").map_err(ser)? != 0,
            single_attempt: row.try_get::<i64, _>("single_attempt").map_err(ser)? != 0,
            exam_paper: row.try_get::<i64, _>("exam_paper").map_err(ser)? != 0,
            draft: row.try_get::<i64, _>("draft").map_err(ser)? != 0,
        };

        let max_questions = row
            .try_get::<Option<i64>, _>("max_questions")
            .map_err(ser)?
            .map(|v| u32_from_i64("max_questions", v))
            .transpose()?;

        let quiz = Quiz::new(
            id,
            course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
            row.try_get::<String, _>("title").map_err(ser)?,
            u8_from_i64("pass_mark", row.try_get::<i64, _>("pass_mark").map_err(ser)?)?,
            question_ids,
            max_questions,
            flags,
            row.try_get("created_at").map_err(ser)?,
        )
        .map_err(ser)?;

        Ok(Some(quiz))
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let kind = match question.variant() {
            QuestionVariant::MultipleChoice { .. } => KIND_MULTIPLE_CHOICE,
            QuestionVariant::Essay => KIND_ESSAY,
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO questions (id, prompt, category, kind)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                prompt = excluded.prompt,
                category = excluded.category,
                kind = excluded.kind
            ",
        )
        .bind(id_i64("question_id", question.id().value())?)
        .bind(question.prompt())
        .bind(question.category().map(|c| c.as_str().to_owned()))
        .bind(kind)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM question_choices WHERE question_id = ?1")
            .bind(id_i64("question_id", question.id().value())?)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if let QuestionVariant::MultipleChoice { choices } = question.variant() {
            for choice in choices {
                sqlx::query(
                    r"
                    INSERT INTO question_choices (question_id, choice_id, text, correct)
                    VALUES (?1, ?2, ?3, ?4)
                    ",
                )
                .bind(id_i64("question_id", question.id().value())?)
                .bind(i64::from(choice.id))
                .bind(choice.text.as_str())
                .bind(i64::from(choice.correct))
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT id, prompt, category, kind
            FROM questions
            WHERE id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id_i64("question_id", id.value())?);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut choice_sql = String::from(
            r"
            SELECT question_id, choice_id, text, correct
            FROM question_choices
            WHERE question_id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                choice_sql.push_str(", ");
            }
            choice_sql.push('?');
            choice_sql.push_str(&(i + 1).to_string());
        }
        choice_sql.push_str(")\n ORDER BY question_id ASC, choice_id ASC");

        let mut cq = sqlx::query(&choice_sql);
        for id in ids {
            cq = cq.bind(id_i64("question_id", id.value())?);
        }

        let choice_rows = cq
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut choices_by_question: HashMap<u64, Vec<_>> = HashMap::new();
        for row in choice_rows {
            let qid = question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
            choices_by_question
                .entry(qid.value())
                .or_default()
                .push(map_choice_row(&row)?);
        }

        let mut by_id: HashMap<u64, Question> = HashMap::with_capacity(rows.len());
        for row in rows {
            let qid = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            let question = build_question(
                qid,
                row.try_get::<String, _>("prompt").map_err(ser)?,
                row.try_get::<Option<String>, _>("category").map_err(ser)?,
                row.try_get::<String, _>("kind").map_err(ser)?.as_str(),
                choices_by_question.remove(&qid.value()).unwrap_or_default(),
            )?;
            by_id.insert(qid.value(), question);
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match by_id.remove(&id.value()) {
                Some(question) => out.push(question),
                None => return Err(StorageError::NotFound),
            }
        }

        Ok(out)
    }
}
