use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::model::{
    Certificate, CompletionTransition, ConversionStatus, Course, CourseId, Enrollment,
    EnrollmentId, GradedSubmission, Lesson, LessonId, LessonProgress, NewCertificate, Question,
    QuestionId, QuestionKey, Quiz, QuizId, Submission, SubmissionId, UserId, ValidatedLesson,
    ValidatedQuestion, ValidatedQuiz,
};
use lms_core::progress::ProgressCounts;
use thiserror::Error;

use crate::memory::InMemoryRepository;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Input for inserting a course; storage assigns the id.
#[derive(Debug, Clone)]
pub struct NewCourseRecord {
    pub title: String,
    pub description: String,
    pub instructor: UserId,
    pub created_at: DateTime<Utc>,
}

/// Result of saving a lesson-progress row together with its enrollment recalculation.
#[derive(Debug, Clone)]
pub struct LessonProgressRecorded {
    pub progress: LessonProgress,
    pub transition: CompletionTransition,
    /// Recalculated enrollment, `None` when nothing was recalculated.
    pub enrollment: Option<Enrollment>,
}

/// Result of persisting a graded submission together with its enrollment recalculation.
#[derive(Debug, Clone)]
pub struct SubmissionRecorded {
    pub submission: Submission,
    pub enrollment: Option<Enrollment>,
}

//
// ─── REPOSITORIES ──────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Insert a course owned by a single instructor.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the title is taken, or other storage errors.
    async fn insert_new_course(&self, course: NewCourseRecord) -> Result<Course, StorageError>;

    /// Persist title, description and the instructor set of an existing course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course is missing, `Conflict` on a taken title.
    async fn update_course(&self, course: &Course) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_courses(&self) -> Result<Vec<Course>, StorageError>;
}

#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course or prerequisite quiz is missing.
    async fn insert_new_lesson(&self, lesson: ValidatedLesson) -> Result<Lesson, StorageError>;

    /// Persist every mutable lesson field, including the content file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson is missing.
    async fn update_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError>;

    /// Delete a lesson together with its progress rows.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError>;

    /// Lessons of a course ordered by `order`, then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_lessons(&self, course: CourseId) -> Result<Vec<Lesson>, StorageError>;

    /// Record the document worker's result for the lesson's current file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson or its file is missing.
    async fn set_conversion_status(
        &self,
        id: LessonId,
        status: &ConversionStatus,
    ) -> Result<Lesson, StorageError>;
}

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course or a referenced lesson is missing.
    async fn insert_new_quiz(&self, quiz: ValidatedQuiz) -> Result<Quiz, StorageError>;

    /// Persist quiz metadata and replace its question links with `quiz.question_ids`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the quiz or a linked question is missing.
    async fn update_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError>;

    /// Delete a quiz with its links and submissions. Linked questions stay in the bank.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn delete_quiz(&self, id: QuizId) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_quizzes(&self, course: CourseId) -> Result<Vec<Quiz>, StorageError>;
}

/// The shared question bank, addressed by id or by `QuestionKey`.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the key is already in the bank.
    async fn insert_new_question(
        &self,
        question: ValidatedQuestion,
    ) -> Result<Question, StorageError>;

    /// Overwrite a question and sync its options by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, `Conflict` if the new key belongs
    /// to another question.
    async fn update_question(
        &self,
        id: QuestionId,
        question: ValidatedQuestion,
    ) -> Result<Question, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError>;

    /// Fetch questions in the order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any are missing.
    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_question(&self, key: &QuestionKey) -> Result<Option<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_questions(&self) -> Result<Vec<Question>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Return the enrollment for (student, course), creating it if absent.
    /// The flag is `true` when a new row was created.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course is missing.
    async fn get_or_create_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(Enrollment, bool), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_enrollment(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_course_enrollments(
        &self,
        course: CourseId,
    ) -> Result<Vec<Enrollment>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_student_enrollments(
        &self,
        student: UserId,
    ) -> Result<Vec<Enrollment>, StorageError>;

    /// Current completion counts for (student, course).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn progress_counts(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<ProgressCounts, StorageError>;

    /// Recompute and store the enrollment's progress from current facts.
    /// Returns `None` when the student is not enrolled.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if reading counts or writing the enrollment fails.
    async fn recalculate_progress(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, StorageError>;
}

#[async_trait]
pub trait LessonProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_lesson_progress(
        &self,
        student: UserId,
        lesson: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_submission(&self, id: SubmissionId) -> Result<Submission, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_submission(
        &self,
        student: UserId,
        quiz: QuizId,
    ) -> Result<Option<Submission>, StorageError>;
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the enrollment already has a certificate.
    async fn insert_certificate(
        &self,
        certificate: NewCertificate,
    ) -> Result<Certificate, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_certificate(
        &self,
        enrollment: EnrollmentId,
    ) -> Result<Option<Certificate>, StorageError>;
}

/// Write a completion fact and recalculate the affected enrollment as one unit.
#[async_trait]
pub trait CompletionPersistence: Send + Sync {
    /// Upsert a lesson-progress row.
    ///
    /// An earlier completion time is kept when the lesson was already completed.
    /// The enrollment in the lesson's course is recalculated only when completion
    /// actually changed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson is missing. Nothing is written on error.
    async fn record_lesson_progress(
        &self,
        progress: LessonProgress,
        now: DateTime<Utc>,
    ) -> Result<LessonProgressRecorded, StorageError>;

    /// Insert a graded submission and recalculate the enrollment in the quiz's course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the student already submitted this quiz.
    /// Nothing is written on error.
    async fn record_submission(
        &self,
        submission: GradedSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionRecorded, StorageError>;
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates every repository behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub lessons: Arc<dyn LessonRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub lesson_progress: Arc<dyn LessonProgressRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
    pub completions: Arc<dyn CompletionPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }

    pub(crate) fn from_backend<B>(backend: B) -> Self
    where
        B: CourseRepository
            + LessonRepository
            + QuizRepository
            + QuestionRepository
            + EnrollmentRepository
            + LessonProgressRepository
            + SubmissionRepository
            + CertificateRepository
            + CompletionPersistence
            + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            courses: backend.clone(),
            lessons: backend.clone(),
            quizzes: backend.clone(),
            questions: backend.clone(),
            enrollments: backend.clone(),
            lesson_progress: backend.clone(),
            submissions: backend.clone(),
            certificates: backend.clone(),
            completions: backend,
        }
    }
}
