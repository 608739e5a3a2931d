use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL UNIQUE CHECK (length(title) BETWEEN 1 AND 255),
            description TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS course_instructors (
            course_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            PRIMARY KEY (course_id, user_id),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS lessons (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            video_url TEXT,
            position INTEGER NOT NULL CHECK (position >= 0),
            prerequisite_quiz_id INTEGER,
            prerequisite_min_score INTEGER CHECK (prerequisite_min_score BETWEEN 0 AND 10000),
            file_ref TEXT,
            conversion_status TEXT,
            conversion_detail TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
            FOREIGN KEY (prerequisite_quiz_id) REFERENCES quizzes(id) ON DELETE SET NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quizzes (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            lesson_id INTEGER,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            time_limit_secs INTEGER CHECK (time_limit_secs > 0),
            prerequisite_lesson_id INTEGER,
            created_at TEXT NOT NULL,
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
            FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE SET NULL,
            FOREIGN KEY (prerequisite_lesson_id) REFERENCES lessons(id) ON DELETE SET NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            text TEXT NOT NULL UNIQUE,
            question_type TEXT NOT NULL CHECK (question_type IN ('mcq', 'tf', 'short')),
            points INTEGER NOT NULL CHECK (points > 0),
            short_answer TEXT
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS options (
            id INTEGER PRIMARY KEY,
            question_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            UNIQUE (question_id, text),
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_questions (
            quiz_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (quiz_id, question_id),
            FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE,
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS enrollments (
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            progress INTEGER NOT NULL CHECK (progress BETWEEN 0 AND 10000),
            completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
            enrolled_at TEXT NOT NULL,
            completed_at TEXT,
            UNIQUE (student_id, course_id),
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS lesson_progress (
            student_id INTEGER NOT NULL,
            lesson_id INTEGER NOT NULL,
            is_completed INTEGER NOT NULL CHECK (is_completed IN (0, 1)),
            completed_at TEXT,
            PRIMARY KEY (student_id, lesson_id),
            FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS submissions (
            id INTEGER PRIMARY KEY,
            student_id INTEGER NOT NULL,
            quiz_id INTEGER NOT NULL,
            score INTEGER NOT NULL CHECK (score >= 0),
            max_score INTEGER NOT NULL CHECK (max_score >= score),
            percentage INTEGER NOT NULL CHECK (percentage BETWEEN 0 AND 10000),
            submitted_at TEXT NOT NULL,
            UNIQUE (student_id, quiz_id),
            FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS student_answers (
            id INTEGER PRIMARY KEY,
            submission_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            selected_option_id INTEGER,
            text_answer TEXT,
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            points_awarded INTEGER NOT NULL CHECK (points_awarded >= 0),
            UNIQUE (submission_id, question_id),
            FOREIGN KEY (submission_id) REFERENCES submissions(id) ON DELETE CASCADE,
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS certificates (
            id INTEGER PRIMARY KEY,
            enrollment_id INTEGER NOT NULL UNIQUE,
            serial TEXT NOT NULL UNIQUE,
            issued_at TEXT NOT NULL,
            certificate_url TEXT,
            FOREIGN KEY (enrollment_id) REFERENCES enrollments(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_lessons_course_position
            ON lessons (course_id, position);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quizzes_course
            ON quizzes (course_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_enrollments_course
            ON enrollments (course_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_submissions_quiz
            ON submissions (quiz_id);
    ",
];

/// Applies versioned schema migrations, each inside its own transaction.
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

    // Version 1: courses, content, question bank, progress and certificates.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

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
