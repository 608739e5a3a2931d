use std::collections::BTreeSet;

use lms_core::model::{Course, CourseId, UserId};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, map_course_row, ser, user_id_from_i64};
use crate::repository::{CourseRepository, NewCourseRecord, StorageError};

async fn load_instructors(
    conn: &mut SqliteConnection,
    course: i64,
) -> Result<BTreeSet<UserId>, StorageError> {
    let rows = sqlx::query("SELECT user_id FROM course_instructors WHERE course_id = ?1")
        .bind(course)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

    let mut out = BTreeSet::new();
    for row in rows {
        out.insert(user_id_from_i64(row.try_get("user_id").map_err(ser)?)?);
    }
    Ok(out)
}

async fn load_course(conn: &mut SqliteConnection, id: i64) -> Result<Course, StorageError> {
    let row = sqlx::query("SELECT id, title, description, created_at FROM courses WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or(StorageError::NotFound)?;
    let instructors = load_instructors(conn, id).await?;
    map_course_row(&row, instructors)
}

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn insert_new_course(&self, course: NewCourseRecord) -> Result<Course, StorageError> {
        let instructor = id_i64("user_id", course.instructor.value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let res = sqlx::query(
            r"
            INSERT INTO courses (title, description, created_at)
            VALUES (?1, ?2, ?3)
            ",
        )
        .bind(course.title.trim())
        .bind(&course.description)
        .bind(course.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        let id = res.last_insert_rowid();

        sqlx::query("INSERT INTO course_instructors (course_id, user_id) VALUES (?1, ?2)")
            .bind(id)
            .bind(instructor)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let created = load_course(&mut tx, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    async fn update_course(&self, course: &Course) -> Result<(), StorageError> {
        let id = id_i64("course_id", course.id().value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let res = sqlx::query("UPDATE courses SET title = ?2, description = ?3 WHERE id = ?1")
            .bind(id)
            .bind(course.title())
            .bind(course.description())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        sqlx::query("DELETE FROM course_instructors WHERE course_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        for user in course.instructors() {
            sqlx::query("INSERT INTO course_instructors (course_id, user_id) VALUES (?1, ?2)")
                .bind(id)
                .bind(id_i64("user_id", user.value())?)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let id = id_i64("course_id", id.value())?;
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_course(&mut conn, id).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let rows = sqlx::query("SELECT id, title, description, created_at FROM courses ORDER BY id")
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            let instructors = load_instructors(&mut conn, id).await?;
            out.push(map_course_row(&row, instructors)?);
        }
        Ok(out)
    }
}
