use chrono::{DateTime, Utc};
use lms_core::model::{CourseId, Enrollment, EnrollmentId, LessonId, LessonProgress, UserId};
use lms_core::progress::ProgressCounts;
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{
    db_err, id_i64, map_enrollment_row, map_lesson_progress_row, percent_i64, ser,
};
use crate::repository::{EnrollmentRepository, LessonProgressRepository, StorageError};

const ENROLLMENT_COLUMNS: &str =
    "id, student_id, course_id, progress, completed, enrolled_at, completed_at";

pub(super) async fn find_enrollment(
    conn: &mut SqliteConnection,
    student: i64,
    course: i64,
) -> Result<Option<Enrollment>, StorageError> {
    let sql =
        format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE student_id = ?1 AND course_id = ?2");
    sqlx::query(&sql)
        .bind(student)
        .bind(course)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .as_ref()
        .map(map_enrollment_row)
        .transpose()
}

pub(super) async fn progress_counts(
    conn: &mut SqliteConnection,
    student: i64,
    course: i64,
) -> Result<ProgressCounts, StorageError> {
    let row = sqlx::query(
        r"
        SELECT
            (SELECT COUNT(*) FROM lessons WHERE course_id = ?2) AS total_lessons,
            (SELECT COUNT(*) FROM quizzes WHERE course_id = ?2) AS total_quizzes,
            (SELECT COUNT(*)
                FROM lesson_progress lp
                JOIN lessons l ON l.id = lp.lesson_id
                WHERE lp.student_id = ?1 AND l.course_id = ?2 AND lp.is_completed = 1
            ) AS completed_lessons,
            (SELECT COUNT(DISTINCT s.quiz_id)
                FROM submissions s
                JOIN quizzes q ON q.id = s.quiz_id
                WHERE s.student_id = ?1 AND q.course_id = ?2
            ) AS completed_quizzes
        ",
    )
    .bind(student)
    .bind(course)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;

    let count = |col: &'static str| -> Result<u64, StorageError> {
        let v: i64 = row.try_get(col).map_err(ser)?;
        u64::try_from(v).map_err(|_| StorageError::Serialization(format!("negative {col}")))
    };
    Ok(ProgressCounts {
        total_lessons: count("total_lessons")?,
        total_quizzes: count("total_quizzes")?,
        completed_lessons: count("completed_lessons")?,
        completed_quizzes: count("completed_quizzes")?,
    })
}

/// Recompute one enrollment from current facts on `conn`, which may be a transaction.
pub(super) async fn recalculate(
    conn: &mut SqliteConnection,
    student: UserId,
    course: CourseId,
    now: DateTime<Utc>,
) -> Result<Option<Enrollment>, StorageError> {
    let student_id = id_i64("student_id", student.value())?;
    let course_id = id_i64("course_id", course.value())?;

    let Some(mut enrollment) = find_enrollment(conn, student_id, course_id).await? else {
        return Ok(None);
    };
    let counts = progress_counts(conn, student_id, course_id).await?;
    if !enrollment.apply_progress(counts.progress(), now) {
        return Ok(Some(enrollment));
    }

    sqlx::query(
        r"
        UPDATE enrollments
        SET progress = ?2, completed = ?3, completed_at = ?4
        WHERE id = ?1
        ",
    )
    .bind(id_i64("enrollment_id", enrollment.id.value())?)
    .bind(percent_i64(enrollment.progress))
    .bind(i64::from(enrollment.completed))
    .bind(enrollment.completed_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(Some(enrollment))
}

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn get_or_create_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(Enrollment, bool), StorageError> {
        let student_id = id_i64("student_id", student.value())?;
        let course_id = id_i64("course_id", course.value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let res = sqlx::query(
            r"
            INSERT INTO enrollments (student_id, course_id, progress, completed, enrolled_at)
            VALUES (?1, ?2, 0, 0, ?3)
            ON CONFLICT(student_id, course_id) DO NOTHING
            ",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        let created = res.rows_affected() > 0;

        let enrollment = find_enrollment(&mut tx, student_id, course_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        tx.commit().await.map_err(db_err)?;
        Ok((enrollment, created))
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, StorageError> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("enrollment_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        map_enrollment_row(&row)
    }

    async fn find_enrollment(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        find_enrollment(
            &mut conn,
            id_i64("student_id", student.value())?,
            id_i64("course_id", course.value())?,
        )
        .await
    }

    async fn list_course_enrollments(
        &self,
        course: CourseId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE course_id = ?1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(id_i64("course_id", course.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(map_enrollment_row).collect()
    }

    async fn list_student_enrollments(
        &self,
        student: UserId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let sql =
            format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE student_id = ?1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(id_i64("student_id", student.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(map_enrollment_row).collect()
    }

    async fn progress_counts(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<ProgressCounts, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        progress_counts(
            &mut conn,
            id_i64("student_id", student.value())?,
            id_i64("course_id", course.value())?,
        )
        .await
    }

    async fn recalculate_progress(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let enrollment = recalculate(&mut tx, student, course, now).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(enrollment)
    }
}

pub(super) async fn get_lesson_progress(
    conn: &mut SqliteConnection,
    student: i64,
    lesson: i64,
) -> Result<Option<LessonProgress>, StorageError> {
    sqlx::query(
        r"
        SELECT student_id, lesson_id, is_completed, completed_at
        FROM lesson_progress
        WHERE student_id = ?1 AND lesson_id = ?2
        ",
    )
    .bind(student)
    .bind(lesson)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?
    .as_ref()
    .map(map_lesson_progress_row)
    .transpose()
}

#[async_trait::async_trait]
impl LessonProgressRepository for SqliteRepository {
    async fn get_lesson_progress(
        &self,
        student: UserId,
        lesson: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        get_lesson_progress(
            &mut conn,
            id_i64("student_id", student.value())?,
            id_i64("lesson_id", lesson.value())?,
        )
        .await
    }
}
