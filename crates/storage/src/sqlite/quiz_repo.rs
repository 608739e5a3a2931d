use lms_core::model::{CourseId, LessonId, QuestionId, Quiz, QuizId, ValidatedQuiz};
use sqlx::{Row, SqliteConnection};
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, map_quiz_row, question_id_from_i64, ser};
use crate::repository::{QuizRepository, StorageError};

const QUIZ_COLUMNS: &str = r"
    id, course_id, lesson_id, title, description, time_limit_secs,
    prerequisite_lesson_id, created_at
";

fn lesson_ref(id: Option<LessonId>) -> Result<Option<i64>, StorageError> {
    id.map(|l| id_i64("lesson_id", l.value())).transpose()
}

async fn load_links(
    conn: &mut SqliteConnection,
    quiz: i64,
) -> Result<Vec<QuestionId>, StorageError> {
    let rows = sqlx::query(
        "SELECT question_id FROM quiz_questions WHERE quiz_id = ?1 ORDER BY position, question_id",
    )
    .bind(quiz)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(question_id_from_i64(row.try_get("question_id").map_err(ser)?)?);
    }
    Ok(out)
}

async fn hydrate(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<Quiz, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let links = load_links(conn, id).await?;
    map_quiz_row(row, links)
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn insert_new_quiz(&self, quiz: ValidatedQuiz) -> Result<Quiz, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO quizzes (
                course_id, lesson_id, title, description, time_limit_secs,
                prerequisite_lesson_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(id_i64("course_id", quiz.course_id.value())?)
        .bind(lesson_ref(quiz.lesson_id)?)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(quiz.time_limit_secs.map(i64::from))
        .bind(lesson_ref(quiz.prerequisite_lesson)?)
        .bind(quiz.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("quiz_id sign overflow".into()))?;
        Ok(quiz.assign_id(QuizId::new(id)))
    }

    async fn update_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let id = id_i64("quiz_id", quiz.id.value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let res = sqlx::query(
            r"
            UPDATE quizzes SET
                lesson_id = ?2,
                title = ?3,
                description = ?4,
                time_limit_secs = ?5,
                prerequisite_lesson_id = ?6
            WHERE id = ?1
            ",
        )
        .bind(id)
        .bind(lesson_ref(quiz.lesson_id)?)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(quiz.time_limit_secs.map(i64::from))
        .bind(lesson_ref(quiz.prerequisite_lesson)?)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        // Set-replace: drop every link, then relink in order.
        sqlx::query("DELETE FROM quiz_questions WHERE quiz_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for (position, question) in quiz.question_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO quiz_questions (quiz_id, question_id, position) VALUES (?1, ?2, ?3)",
            )
            .bind(id)
            .bind(id_i64("question_id", question.value())?)
            .bind(i64::try_from(position).map_err(ser)?)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let sql = format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("quiz_id", id.value())?)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        hydrate(&mut conn, &row).await
    }

    async fn delete_quiz(&self, id: QuizId) -> Result<(), StorageError> {
        // Links and submissions cascade; lesson prerequisites are set to NULL.
        let res = sqlx::query("DELETE FROM quizzes WHERE id = ?1")
            .bind(id_i64("quiz_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_quizzes(&self, course: CourseId) -> Result<Vec<Quiz>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let sql = format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE course_id = ?1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(id_i64("course_id", course.value())?)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(hydrate(&mut conn, row).await?);
        }
        Ok(out)
    }
}
