use std::sync::Arc;

use lms_core::model::{CourseId, Enrollment, UserId};
use lms_core::recalc::{ProgressEvent, RecalcScope};
use serde::Serialize;
use storage::repository::{CourseRepository, EnrollmentRepository};
use tracing::{debug, warn};

use crate::Clock;
use crate::error::ServiceError;

/// Outcome of recalculating every enrollment in scope of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub recalculated: usize,
    pub failed: usize,
}

impl FanOutReport {
    fn merge(&mut self, other: &FanOutReport) {
        self.recalculated += other.recalculated;
        self.failed += other.failed;
    }
}

/// Routes progress events to the enrollments they affect and recalculates them.
///
/// Completion facts recorded through `CompletionPersistence` are already
/// recalculated inside their own transaction; this trigger handles the rest:
/// content edits (fan-out over a course), new enrollments and manual reruns.
#[derive(Clone)]
pub struct RecalcTrigger {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
}

impl RecalcTrigger {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            enrollments,
        }
    }

    /// Recalculate whatever `event` affects.
    ///
    /// A single-enrollment scope propagates its failure. A course scope logs and
    /// counts per-enrollment failures and keeps going.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the single enrollment cannot be
    /// recalculated or the course's enrollments cannot be listed.
    pub async fn dispatch(&self, event: ProgressEvent) -> Result<FanOutReport, ServiceError> {
        match event.scope() {
            RecalcScope::Enrollment { student, course } => {
                let updated = self.recalculate(student, course).await?;
                Ok(FanOutReport {
                    recalculated: usize::from(updated.is_some()),
                    failed: 0,
                })
            }
            RecalcScope::Course(course) => self.recalculate_course(course).await,
            RecalcScope::Nothing => Ok(FanOutReport::default()),
        }
    }

    /// Recalculate one student's enrollment; `None` when the student is not enrolled.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the recalculation cannot be persisted.
    pub async fn recalculate(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, ServiceError> {
        let updated = self
            .enrollments
            .recalculate_progress(student, course, self.clock.now())
            .await?;
        if let Some(enrollment) = &updated {
            debug!(
                student = %student,
                course = %course,
                progress = %enrollment.progress,
                completed = enrollment.completed,
                "enrollment recalculated"
            );
        }
        Ok(updated)
    }

    /// Recalculate every enrollment of a course.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if the enrollments cannot be listed.
    pub async fn recalculate_course(&self, course: CourseId) -> Result<FanOutReport, ServiceError> {
        let enrollments = self.enrollments.list_course_enrollments(course).await?;
        let mut report = FanOutReport::default();
        for enrollment in enrollments {
            match self.recalculate(enrollment.student, course).await {
                Ok(_) => report.recalculated += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        enrollment = %enrollment.id,
                        course = %course,
                        error = %err,
                        "enrollment recalculation failed"
                    );
                }
            }
        }
        debug!(
            course = %course,
            recalculated = report.recalculated,
            failed = report.failed,
            "course fan-out finished"
        );
        Ok(report)
    }

    /// Recalculate every enrollment of every course.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if courses cannot be listed.
    pub async fn recalculate_all(&self) -> Result<FanOutReport, ServiceError> {
        let mut report = FanOutReport::default();
        for course in self.courses.list_courses().await? {
            match self.recalculate_course(course.id()).await {
                Ok(partial) => report.merge(&partial),
                Err(err) => {
                    report.failed += 1;
                    warn!(course = %course.id(), error = %err, "course recalculation failed");
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{LessonDraft, LessonProgress};
    use lms_core::recalc::ContentChange;
    use lms_core::time::{fixed_clock, fixed_now};
    use storage::InMemoryRepository;
    use storage::repository::{CompletionPersistence, LessonRepository, NewCourseRecord};

    async fn course_with_lesson(repo: &InMemoryRepository) -> (CourseId, lms_core::model::LessonId) {
        let course = repo
            .insert_new_course(NewCourseRecord {
                title: "Rust".into(),
                description: String::new(),
                instructor: UserId::new(100),
                created_at: fixed_now(),
            })
            .await
            .unwrap()
            .id();
        let lesson = repo
            .insert_new_lesson(
                LessonDraft {
                    course_id: course,
                    title: "Ownership".into(),
                    content: String::new(),
                    video_url: None,
                    order: 1,
                    prerequisite: None,
                }
                .validate(fixed_now())
                .unwrap(),
            )
            .await
            .unwrap();
        (course, lesson.id)
    }

    #[tokio::test]
    async fn content_change_fans_out_to_every_enrollment() {
        let repo = InMemoryRepository::new();
        let (course, lesson) = course_with_lesson(&repo).await;
        for student in 1..=3 {
            repo.get_or_create_enrollment(UserId::new(student), course, fixed_now())
                .await
                .unwrap();
        }
        repo.record_lesson_progress(
            LessonProgress::mark(UserId::new(1), lesson, true, fixed_now()),
            fixed_now(),
        )
        .await
        .unwrap();

        let trigger = RecalcTrigger::new(fixed_clock(), Arc::new(repo.clone()), Arc::new(repo.clone()));
        let report = trigger
            .dispatch(ProgressEvent::ContentChanged {
                course,
                change: ContentChange::LessonUpdated,
            })
            .await
            .unwrap();
        assert_eq!(
            report,
            FanOutReport {
                recalculated: 3,
                failed: 0
            }
        );
        let first = repo.find_enrollment(UserId::new(1), course).await.unwrap().unwrap();
        assert!(first.completed);
    }

    #[tokio::test]
    async fn unenrolled_student_is_a_no_op() {
        let repo = InMemoryRepository::new();
        let (course, _) = course_with_lesson(&repo).await;
        let trigger = RecalcTrigger::new(fixed_clock(), Arc::new(repo.clone()), Arc::new(repo));
        let report = trigger
            .dispatch(ProgressEvent::SubmissionCreated {
                student: UserId::new(9),
                course,
            })
            .await
            .unwrap();
        assert_eq!(report, FanOutReport::default());
    }
}
