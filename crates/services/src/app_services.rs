use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::access_service::AccessService;
use crate::certificate_service::CertificateService;
use crate::collaborators::Collaborators;
use crate::course_service::CourseService;
use crate::enrollment_service::EnrollmentService;
use crate::error::AppServicesError;
use crate::lesson_service::LessonService;
use crate::progress_service::LessonProgressService;
use crate::question_bank::QuestionBank;
use crate::quiz_service::QuizService;
use crate::recalc_trigger::RecalcTrigger;
use crate::submission_service::SubmissionService;

/// Every service wired to one storage backend and one set of collaborators.
#[derive(Clone)]
pub struct AppServices {
    courses: Arc<CourseService>,
    lessons: Arc<LessonService>,
    quizzes: Arc<QuizService>,
    enrollments: Arc<EnrollmentService>,
    lesson_progress: Arc<LessonProgressService>,
    submissions: Arc<SubmissionService>,
    access: Arc<AccessService>,
    certificates: Arc<CertificateService>,
    trigger: Arc<RecalcTrigger>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, migrating the schema first.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        collaborators: Collaborators,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, clock, collaborators))
    }

    /// Build services over in-memory storage and collaborators.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(&Storage::in_memory(), clock, Collaborators::in_memory())
    }

    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, collaborators: Collaborators) -> Self {
        let trigger = RecalcTrigger::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
        );
        let access = AccessService::new(
            Arc::clone(&storage.courses),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.submissions),
            Arc::clone(&storage.lesson_progress),
        );
        let courses = CourseService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.quizzes),
        );
        let lessons = LessonService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.quizzes),
            Arc::clone(&collaborators.files),
            Arc::clone(&collaborators.conversions),
            Arc::clone(&collaborators.media),
            access.clone(),
            trigger.clone(),
        );
        let quizzes = QuizService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.quizzes),
            QuestionBank::new(Arc::clone(&storage.questions)),
            trigger.clone(),
        );
        let enrollments = EnrollmentService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.enrollments),
            trigger.clone(),
        );
        let lesson_progress = LessonProgressService::new(
            clock,
            Arc::clone(&storage.lesson_progress),
            Arc::clone(&storage.completions),
        );
        let submissions = SubmissionService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.questions),
            Arc::clone(&storage.submissions),
            Arc::clone(&storage.completions),
        );
        let certificates = CertificateService::new(
            clock,
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.certificates),
            Arc::clone(&collaborators.certificates),
        );

        Self {
            courses: Arc::new(courses),
            lessons: Arc::new(lessons),
            quizzes: Arc::new(quizzes),
            enrollments: Arc::new(enrollments),
            lesson_progress: Arc::new(lesson_progress),
            submissions: Arc::new(submissions),
            access: Arc::new(access),
            certificates: Arc::new(certificates),
            trigger: Arc::new(trigger),
        }
    }

    #[must_use]
    pub fn courses(&self) -> Arc<CourseService> {
        Arc::clone(&self.courses)
    }

    #[must_use]
    pub fn lessons(&self) -> Arc<LessonService> {
        Arc::clone(&self.lessons)
    }

    #[must_use]
    pub fn quizzes(&self) -> Arc<QuizService> {
        Arc::clone(&self.quizzes)
    }

    #[must_use]
    pub fn enrollments(&self) -> Arc<EnrollmentService> {
        Arc::clone(&self.enrollments)
    }

    #[must_use]
    pub fn lesson_progress(&self) -> Arc<LessonProgressService> {
        Arc::clone(&self.lesson_progress)
    }

    #[must_use]
    pub fn submissions(&self) -> Arc<SubmissionService> {
        Arc::clone(&self.submissions)
    }

    #[must_use]
    pub fn access(&self) -> Arc<AccessService> {
        Arc::clone(&self.access)
    }

    #[must_use]
    pub fn certificates(&self) -> Arc<CertificateService> {
        Arc::clone(&self.certificates)
    }

    #[must_use]
    pub fn recalc(&self) -> Arc<RecalcTrigger> {
        Arc::clone(&self.trigger)
    }
}
