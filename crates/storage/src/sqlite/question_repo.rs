use std::collections::HashMap;

use lms_core::model::{Question, QuestionId, QuestionKey, ValidatedQuestion};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, map_option_row, map_question_row, ser};
use crate::repository::{QuestionRepository, StorageError};

async fn load_question(conn: &mut SqliteConnection, id: i64) -> Result<Question, StorageError> {
    let row = sqlx::query(
        "SELECT id, text, question_type, points, short_answer FROM questions WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?
    .ok_or(StorageError::NotFound)?;

    let option_rows = sqlx::query(
        "SELECT id, text, is_correct FROM options WHERE question_id = ?1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    let mut options = Vec::with_capacity(option_rows.len());
    for row in &option_rows {
        options.push(map_option_row(row)?);
    }
    map_question_row(&row, options)
}

async fn insert_option(
    conn: &mut SqliteConnection,
    question: i64,
    text: &str,
    is_correct: bool,
) -> Result<(), StorageError> {
    sqlx::query("INSERT INTO options (question_id, text, is_correct) VALUES (?1, ?2, ?3)")
        .bind(question)
        .bind(text)
        .bind(i64::from(is_correct))
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn insert_new_question(
        &self,
        question: ValidatedQuestion,
    ) -> Result<Question, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let res = sqlx::query(
            r"
            INSERT INTO questions (text, question_type, points, short_answer)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(question.text())
        .bind(question.question_type.as_str())
        .bind(i64::from(question.points))
        .bind(question.short_answer.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        let id = res.last_insert_rowid();

        for option in &question.options {
            insert_option(&mut tx, id, &option.text, option.is_correct).await?;
        }

        let created = load_question(&mut tx, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    async fn update_question(
        &self,
        id: QuestionId,
        question: ValidatedQuestion,
    ) -> Result<Question, StorageError> {
        let qid = id_i64("question_id", id.value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let existing = load_question(&mut tx, qid).await?;
        let plan = existing.plan_option_sync(&question.options);

        let res = sqlx::query(
            r"
            UPDATE questions
            SET text = ?2, question_type = ?3, points = ?4, short_answer = ?5
            WHERE id = ?1
            ",
        )
        .bind(qid)
        .bind(question.text())
        .bind(question.question_type.as_str())
        .bind(i64::from(question.points))
        .bind(question.short_answer.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        // Deletes first so a renamed option may take a removed option's text.
        for option in &plan.delete {
            sqlx::query("DELETE FROM options WHERE id = ?1 AND question_id = ?2")
                .bind(id_i64("option_id", option.value())?)
                .bind(qid)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        // Park kept options on placeholder texts so two of them can swap texts
        // without tripping UNIQUE(question_id, text) halfway through.
        for option in &plan.update {
            sqlx::query("UPDATE options SET text = char(1) || id WHERE id = ?1 AND question_id = ?2")
                .bind(id_i64("option_id", option.id.value())?)
                .bind(qid)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        for option in &plan.update {
            sqlx::query("UPDATE options SET text = ?3, is_correct = ?4 WHERE id = ?1 AND question_id = ?2")
                .bind(id_i64("option_id", option.id.value())?)
                .bind(qid)
                .bind(&option.text)
                .bind(i64::from(option.is_correct))
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        for option in &plan.create {
            insert_option(&mut tx, qid, &option.text, option.is_correct).await?;
        }

        let updated = load_question(&mut tx, qid).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_question(&mut conn, id_i64("question_id", id.value())?).await
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let mut cache: HashMap<QuestionId, Question> = HashMap::with_capacity(ids.len());
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let question = match cache.get(id) {
                Some(q) => q.clone(),
                None => {
                    let q = load_question(&mut conn, id_i64("question_id", id.value())?).await?;
                    cache.insert(*id, q.clone());
                    q
                }
            };
            out.push(question);
        }
        Ok(out)
    }

    async fn find_question(&self, key: &QuestionKey) -> Result<Option<Question>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let row = sqlx::query("SELECT id FROM questions WHERE text = ?1")
            .bind(key.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let id: i64 = row.try_get("id").map_err(ser)?;
                Ok(Some(load_question(&mut conn, id).await?))
            }
            None => Ok(None),
        }
    }

    async fn list_questions(&self) -> Result<Vec<Question>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let rows = sqlx::query("SELECT id FROM questions ORDER BY id")
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            out.push(load_question(&mut conn, id).await?);
        }
        Ok(out)
    }
}
