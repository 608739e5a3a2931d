use chrono::{DateTime, Utc};
use lms_core::model::{
    GradedSubmission, LessonProgress, QuizId, Submission, SubmissionId, UserId,
};
use lms_core::recalc::{ProgressEvent, RecalcScope};
use sqlx::{Row, SqliteConnection};
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::enrollment_repo::{get_lesson_progress, recalculate};
use super::mapping::{
    course_id_from_i64, db_err, id_i64, map_answer_row, map_submission_row, percent_i64, ser,
};
use crate::repository::{
    CompletionPersistence, LessonProgressRecorded, StorageError, SubmissionRecorded,
    SubmissionRepository,
};

const SUBMISSION_COLUMNS: &str =
    "id, quiz_id, student_id, score, max_score, percentage, submitted_at";

async fn hydrate(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<Submission, StorageError> {
    let header = map_submission_row(row)?;
    let answer_rows = sqlx::query(
        r"
        SELECT question_id, selected_option_id, text_answer, is_correct, points_awarded
        FROM student_answers
        WHERE submission_id = ?1
        ORDER BY id
        ",
    )
    .bind(id_i64("submission_id", header.id.value())?)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    let mut answers = Vec::with_capacity(answer_rows.len());
    for row in &answer_rows {
        answers.push(map_answer_row(row)?);
    }
    Ok(Submission {
        id: header.id,
        quiz_id: header.quiz_id,
        student: header.student,
        score: header.score,
        max_score: header.max_score,
        percentage: header.percentage,
        answers,
        submitted_at: header.submitted_at,
    })
}

async fn recalculate_scope(
    conn: &mut SqliteConnection,
    scope: RecalcScope,
    now: DateTime<Utc>,
) -> Result<Option<lms_core::model::Enrollment>, StorageError> {
    match scope {
        RecalcScope::Enrollment { student, course } => {
            recalculate(conn, student, course, now).await
        }
        RecalcScope::Course(_) | RecalcScope::Nothing => Ok(None),
    }
}

#[async_trait::async_trait]
impl SubmissionRepository for SqliteRepository {
    async fn get_submission(&self, id: SubmissionId) -> Result<Submission, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("submission_id", id.value())?)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        hydrate(&mut conn, &row).await
    }

    async fn find_submission(
        &self,
        student: UserId,
        quiz: QuizId,
    ) -> Result<Option<Submission>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE student_id = ?1 AND quiz_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("student_id", student.value())?)
            .bind(id_i64("quiz_id", quiz.value())?)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(Some(hydrate(&mut conn, &row).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl CompletionPersistence for SqliteRepository {
    async fn record_lesson_progress(
        &self,
        progress: LessonProgress,
        now: DateTime<Utc>,
    ) -> Result<LessonProgressRecorded, StorageError> {
        let student = id_i64("student_id", progress.student.value())?;
        let lesson = id_i64("lesson_id", progress.lesson_id.value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let course_row = sqlx::query("SELECT course_id FROM lessons WHERE id = ?1")
            .bind(lesson)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        let course = course_id_from_i64(course_row.try_get("course_id").map_err(ser)?)?;

        let previous = get_lesson_progress(&mut tx, student, lesson).await?;
        let saved = progress.merged_with(previous.as_ref());
        let transition = saved.transition_from(previous.as_ref());

        sqlx::query(
            r"
            INSERT INTO lesson_progress (student_id, lesson_id, is_completed, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(student_id, lesson_id) DO UPDATE SET
                is_completed = excluded.is_completed,
                completed_at = excluded.completed_at
            ",
        )
        .bind(student)
        .bind(lesson)
        .bind(i64::from(saved.is_completed))
        .bind(saved.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let event = ProgressEvent::LessonProgressSaved {
            student: saved.student,
            course,
            transition,
        };
        let enrollment = recalculate_scope(&mut tx, event.scope(), now).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(LessonProgressRecorded {
            progress: saved,
            transition,
            enrollment,
        })
    }

    async fn record_submission(
        &self,
        submission: GradedSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionRecorded, StorageError> {
        let student = id_i64("student_id", submission.student.value())?;
        let quiz = id_i64("quiz_id", submission.quiz_id.value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let course_row = sqlx::query("SELECT course_id FROM quizzes WHERE id = ?1")
            .bind(quiz)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        let course = course_id_from_i64(course_row.try_get("course_id").map_err(ser)?)?;

        // UNIQUE(student_id, quiz_id) turns a second attempt into StorageError::Conflict.
        let res = sqlx::query(
            r"
            INSERT INTO submissions (student_id, quiz_id, score, max_score, percentage, submitted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(student)
        .bind(quiz)
        .bind(i64::from(submission.score))
        .bind(i64::from(submission.max_score))
        .bind(percent_i64(submission.percentage))
        .bind(submission.submitted_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        let id = res.last_insert_rowid();

        for answer in &submission.answers {
            sqlx::query(
                r"
                INSERT INTO student_answers (
                    submission_id, question_id, selected_option_id, text_answer,
                    is_correct, points_awarded
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(id)
            .bind(id_i64("question_id", answer.question_id.value())?)
            // An option id past the column range cannot name a stored option;
            // the answer was already graded incorrect, so keep it as unanswered.
            .bind(
                answer
                    .selected_option
                    .and_then(|o| i64::try_from(o.value()).ok()),
            )
            .bind(answer.text_answer.as_deref())
            .bind(i64::from(answer.is_correct))
            .bind(i64::from(answer.points_awarded))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        let event = ProgressEvent::SubmissionCreated {
            student: submission.student,
            course,
        };
        let enrollment = recalculate_scope(&mut tx, event.scope(), now).await?;
        tx.commit().await.map_err(db_err)?;

        let id = u64::try_from(id)
            .map_err(|_| StorageError::Serialization("submission_id sign overflow".into()))?;
        Ok(SubmissionRecorded {
            submission: submission.assign_id(SubmissionId::new(id)),
            enrollment,
        })
    }
}
