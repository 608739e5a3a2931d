use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use lms_core::model::{
    AnswerOption, Certificate, CertificateId, ContentFile, ConversionStatus, Course, CourseId,
    Enrollment, EnrollmentId, Lesson, LessonId, LessonProgress, OptionId, Percent, Question,
    QuestionId, QuestionType, Quiz, QuizId, QuizPrerequisite, StudentAnswer, SubmissionId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use url::Url;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Map driver errors, surfacing constraint violations as domain-level storage errors.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::RowNotFound => StorageError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
        _ => StorageError::Connection(e.to_string()),
    }
}

//
// ─── IDS ───────────────────────────────────────────────────────────────────────
//

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_col(row: &SqliteRow, col: &'static str) -> Result<u32, StorageError> {
    let v: i64 = row.try_get(col).map_err(ser)?;
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {col}: {v}")))
}

macro_rules! id_column {
    ($fn_name:ident, $ty:ident) => {
        pub(crate) fn $fn_name(row: &SqliteRow, col: &'static str) -> Result<$ty, StorageError> {
            let v: i64 = row.try_get(col).map_err(ser)?;
            Ok($ty::new(i64_to_u64(col, v)?))
        }
    };
}

id_column!(course_id_col, CourseId);
id_column!(lesson_id_col, LessonId);
id_column!(quiz_id_col, QuizId);
id_column!(question_id_col, QuestionId);
id_column!(option_id_col, OptionId);
id_column!(user_id_col, UserId);
id_column!(enrollment_id_col, EnrollmentId);
id_column!(submission_id_col, SubmissionId);
id_column!(certificate_id_col, CertificateId);

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

fn optional_id<T>(
    row: &SqliteRow,
    col: &'static str,
    make: fn(u64) -> T,
) -> Result<Option<T>, StorageError> {
    let v: Option<i64> = row.try_get(col).map_err(ser)?;
    v.map(|raw| i64_to_u64(col, raw).map(make)).transpose()
}

//
// ─── VALUES ────────────────────────────────────────────────────────────────────
//

pub(crate) fn percent_col(row: &SqliteRow, col: &'static str) -> Result<Percent, StorageError> {
    let v: i64 = row.try_get(col).map_err(ser)?;
    let hundredths =
        u16::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {col}: {v}")))?;
    Percent::from_hundredths(hundredths).map_err(ser)
}

pub(crate) fn percent_i64(p: Percent) -> i64 {
    i64::from(p.hundredths())
}

fn bool_col(row: &SqliteRow, col: &'static str) -> Result<bool, StorageError> {
    let v: i64 = row.try_get(col).map_err(ser)?;
    Ok(v != 0)
}

/// Storage columns `(conversion_status, conversion_detail)` for a content file.
pub(crate) fn conversion_columns(status: &ConversionStatus) -> (&'static str, Option<String>) {
    let detail = match status {
        ConversionStatus::Ready { output_ref } => Some(output_ref.clone()),
        ConversionStatus::Failed { reason } => Some(reason.clone()),
        ConversionStatus::NotRequired | ConversionStatus::Pending => None,
    };
    (status.as_str(), detail)
}

fn parse_conversion(code: &str, detail: Option<String>) -> Result<ConversionStatus, StorageError> {
    match code {
        "not_required" => Ok(ConversionStatus::NotRequired),
        "pending" => Ok(ConversionStatus::Pending),
        "ready" => Ok(ConversionStatus::Ready {
            output_ref: detail.unwrap_or_default(),
        }),
        "failed" => Ok(ConversionStatus::Failed {
            reason: detail.unwrap_or_default(),
        }),
        other => Err(StorageError::Serialization(format!(
            "invalid conversion status: {other}"
        ))),
    }
}

//
// ─── ROW MAPPERS ───────────────────────────────────────────────────────────────
//

pub(crate) fn map_course_row(
    row: &SqliteRow,
    instructors: BTreeSet<UserId>,
) -> Result<Course, StorageError> {
    Course::from_persisted(
        course_id_col(row, "id")?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<String, _>("description").map_err(ser)?,
        instructors,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    let video_url = row
        .try_get::<Option<String>, _>("video_url")
        .map_err(ser)?
        .map(|raw| Url::parse(&raw).map_err(ser))
        .transpose()?;

    let prerequisite = match optional_id(row, "prerequisite_quiz_id", QuizId::new)? {
        Some(quiz_id) => Some(QuizPrerequisite {
            quiz_id,
            min_score: percent_col(row, "prerequisite_min_score")?,
        }),
        None => None,
    };

    let content_file = match row.try_get::<Option<String>, _>("file_ref").map_err(ser)? {
        Some(file_ref) => {
            let code: String = row.try_get("conversion_status").map_err(ser)?;
            let detail: Option<String> = row.try_get("conversion_detail").map_err(ser)?;
            Some(ContentFile {
                file_ref,
                status: parse_conversion(&code, detail)?,
            })
        }
        None => None,
    };

    Ok(Lesson {
        id: lesson_id_col(row, "id")?,
        course_id: course_id_col(row, "course_id")?,
        title: row.try_get("title").map_err(ser)?,
        content: row.try_get("content").map_err(ser)?,
        video_url,
        order: u32_col(row, "position")?,
        prerequisite,
        content_file,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_quiz_row(
    row: &SqliteRow,
    question_ids: Vec<QuestionId>,
) -> Result<Quiz, StorageError> {
    let time_limit_secs = row
        .try_get::<Option<i64>, _>("time_limit_secs")
        .map_err(ser)?
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| StorageError::Serialization(format!("invalid time_limit_secs: {v}")))
        })
        .transpose()?;

    Ok(Quiz {
        id: quiz_id_col(row, "id")?,
        course_id: course_id_col(row, "course_id")?,
        lesson_id: optional_id(row, "lesson_id", LessonId::new)?,
        title: row.try_get("title").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        time_limit_secs,
        prerequisite_lesson: optional_id(row, "prerequisite_lesson_id", LessonId::new)?,
        question_ids,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_option_row(row: &SqliteRow) -> Result<AnswerOption, StorageError> {
    Ok(AnswerOption {
        id: option_id_col(row, "id")?,
        text: row.try_get("text").map_err(ser)?,
        is_correct: bool_col(row, "is_correct")?,
    })
}

pub(crate) fn map_question_row(
    row: &SqliteRow,
    options: Vec<AnswerOption>,
) -> Result<Question, StorageError> {
    let code: String = row.try_get("question_type").map_err(ser)?;
    Ok(Question {
        id: question_id_col(row, "id")?,
        text: row.try_get("text").map_err(ser)?,
        question_type: QuestionType::parse(&code).map_err(ser)?,
        points: u32_col(row, "points")?,
        short_answer: row.try_get("short_answer").map_err(ser)?,
        options,
    })
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment {
        id: enrollment_id_col(row, "id")?,
        student: user_id_col(row, "student_id")?,
        course_id: course_id_col(row, "course_id")?,
        progress: percent_col(row, "progress")?,
        completed: bool_col(row, "completed")?,
        enrolled_at: row.try_get("enrolled_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_lesson_progress_row(row: &SqliteRow) -> Result<LessonProgress, StorageError> {
    Ok(LessonProgress {
        student: user_id_col(row, "student_id")?,
        lesson_id: lesson_id_col(row, "lesson_id")?,
        is_completed: bool_col(row, "is_completed")?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_answer_row(row: &SqliteRow) -> Result<StudentAnswer, StorageError> {
    Ok(StudentAnswer {
        question_id: question_id_col(row, "question_id")?,
        selected_option: optional_id(row, "selected_option_id", OptionId::new)?,
        text_answer: row.try_get("text_answer").map_err(ser)?,
        is_correct: bool_col(row, "is_correct")?,
        points_awarded: u32_col(row, "points_awarded")?,
    })
}

/// Submission header columns; answers are loaded separately.
pub(crate) struct SubmissionHeader {
    pub id: SubmissionId,
    pub quiz_id: QuizId,
    pub student: UserId,
    pub score: u32,
    pub max_score: u32,
    pub percentage: Percent,
    pub submitted_at: DateTime<Utc>,
}

pub(crate) fn map_submission_row(row: &SqliteRow) -> Result<SubmissionHeader, StorageError> {
    Ok(SubmissionHeader {
        id: submission_id_col(row, "id")?,
        quiz_id: quiz_id_col(row, "quiz_id")?,
        student: user_id_col(row, "student_id")?,
        score: u32_col(row, "score")?,
        max_score: u32_col(row, "max_score")?,
        percentage: percent_col(row, "percentage")?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
    })
}

pub(crate) fn map_certificate_row(row: &SqliteRow) -> Result<Certificate, StorageError> {
    let serial: String = row.try_get("serial").map_err(ser)?;
    let certificate_url = row
        .try_get::<Option<String>, _>("certificate_url")
        .map_err(ser)?
        .map(|raw| Url::parse(&raw).map_err(ser))
        .transpose()?;
    Ok(Certificate {
        id: certificate_id_col(row, "id")?,
        enrollment_id: enrollment_id_col(row, "enrollment_id")?,
        serial: Uuid::parse_str(&serial).map_err(ser)?,
        issued_at: row.try_get("issued_at").map_err(ser)?,
        certificate_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_status_round_trips_through_columns() {
        for status in [
            ConversionStatus::NotRequired,
            ConversionStatus::Pending,
            ConversionStatus::Ready {
                output_ref: "converted/1.pdf".into(),
            },
            ConversionStatus::Failed {
                reason: "timeout".into(),
            },
        ] {
            let (code, detail) = conversion_columns(&status);
            assert_eq!(parse_conversion(code, detail).unwrap(), status);
        }
        assert!(parse_conversion("queued", None).is_err());
    }

    #[test]
    fn ids_beyond_i64_are_rejected() {
        assert!(id_i64("course_id", u64::MAX).is_err());
        assert_eq!(id_i64("course_id", 7).unwrap(), 7);
    }
}
