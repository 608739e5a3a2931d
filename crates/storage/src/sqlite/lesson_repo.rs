use lms_core::model::{ConversionStatus, CourseId, Lesson, LessonId, ValidatedLesson};

use super::SqliteRepository;
use super::mapping::{conversion_columns, db_err, id_i64, map_lesson_row, percent_i64};
use crate::repository::{LessonRepository, StorageError};

const LESSON_COLUMNS: &str = r"
    id, course_id, title, content, video_url, position,
    prerequisite_quiz_id, prerequisite_min_score,
    file_ref, conversion_status, conversion_detail, created_at
";

/// `(prerequisite_quiz_id, prerequisite_min_score)` bind values.
fn prerequisite_columns(
    lesson_prerequisite: Option<lms_core::model::QuizPrerequisite>,
) -> Result<(Option<i64>, Option<i64>), StorageError> {
    match lesson_prerequisite {
        Some(pre) => Ok((
            Some(id_i64("quiz_id", pre.quiz_id.value())?),
            Some(percent_i64(pre.min_score)),
        )),
        None => Ok((None, None)),
    }
}

#[async_trait::async_trait]
impl LessonRepository for SqliteRepository {
    async fn insert_new_lesson(&self, lesson: ValidatedLesson) -> Result<Lesson, StorageError> {
        let course = id_i64("course_id", lesson.course_id.value())?;
        let (pre_quiz, pre_score) = prerequisite_columns(lesson.prerequisite)?;

        let res = sqlx::query(
            r"
            INSERT INTO lessons (
                course_id, title, content, video_url, position,
                prerequisite_quiz_id, prerequisite_min_score, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(course)
        .bind(&lesson.title)
        .bind(&lesson.content)
        .bind(lesson.video_url.as_ref().map(url::Url::as_str))
        .bind(i64::from(lesson.order))
        .bind(pre_quiz)
        .bind(pre_score)
        .bind(lesson.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = res.last_insert_rowid();
        let id = u64::try_from(id)
            .map_err(|_| StorageError::Serialization("lesson_id sign overflow".into()))?;
        Ok(lesson.assign_id(LessonId::new(id)))
    }

    async fn update_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let (pre_quiz, pre_score) = prerequisite_columns(lesson.prerequisite)?;
        let (file_ref, status, detail) = match &lesson.content_file {
            Some(file) => {
                let (code, detail) = conversion_columns(&file.status);
                (Some(file.file_ref.as_str()), Some(code), detail)
            }
            None => (None, None, None),
        };

        let res = sqlx::query(
            r"
            UPDATE lessons SET
                title = ?2,
                content = ?3,
                video_url = ?4,
                position = ?5,
                prerequisite_quiz_id = ?6,
                prerequisite_min_score = ?7,
                file_ref = ?8,
                conversion_status = ?9,
                conversion_detail = ?10
            WHERE id = ?1
            ",
        )
        .bind(id_i64("lesson_id", lesson.id.value())?)
        .bind(&lesson.title)
        .bind(&lesson.content)
        .bind(lesson.video_url.as_ref().map(url::Url::as_str))
        .bind(i64::from(lesson.order))
        .bind(pre_quiz)
        .bind(pre_score)
        .bind(file_ref)
        .bind(status)
        .bind(detail)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError> {
        let sql = format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("lesson_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        map_lesson_row(&row)
    }

    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        // lesson_progress rows cascade; quiz references are set to NULL.
        let res = sqlx::query("DELETE FROM lessons WHERE id = ?1")
            .bind(id_i64("lesson_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_lessons(&self, course: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM lessons WHERE course_id = ?1 ORDER BY position, id"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("course_id", course.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_lesson_row(&row)?);
        }
        Ok(out)
    }

    async fn set_conversion_status(
        &self,
        id: LessonId,
        status: &ConversionStatus,
    ) -> Result<Lesson, StorageError> {
        let (code, detail) = conversion_columns(status);
        let res = sqlx::query(
            r"
            UPDATE lessons
            SET conversion_status = ?2, conversion_detail = ?3
            WHERE id = ?1 AND file_ref IS NOT NULL
            ",
        )
        .bind(id_i64("lesson_id", id.value())?)
        .bind(code)
        .bind(detail)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        self.get_lesson(id).await
    }
}
