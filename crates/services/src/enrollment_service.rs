use std::sync::Arc;

use lms_core::model::{CourseId, Enrollment, EnrollmentId, Principal, UserId};
use lms_core::progress::ProgressCounts;
use lms_core::recalc::ProgressEvent;
use serde::Serialize;
use storage::repository::{CourseRepository, EnrollmentRepository};
use tracing::info;

use crate::Clock;
use crate::authz::{require_editor, require_reader, require_self};
use crate::error::{OrNotFound, ServiceError};
use crate::recalc_trigger::RecalcTrigger;

/// An enrollment with the counts its progress was computed from.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub enrollment: Enrollment,
    pub counts: ProgressCounts,
}

#[derive(Clone)]
pub struct EnrollmentService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    trigger: RecalcTrigger,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        trigger: RecalcTrigger,
    ) -> Self {
        Self {
            clock,
            courses,
            enrollments,
            trigger,
        }
    }

    /// Enroll `student` in each course, reusing existing enrollments.
    ///
    /// New enrollments are recalculated at once so completion facts recorded
    /// before enrolling already count.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` when enrolling someone else without being
    /// an admin, and `NotFound` for a missing course (earlier courses stay enrolled).
    pub async fn enroll(
        &self,
        principal: &Principal,
        student: UserId,
        courses: &[CourseId],
    ) -> Result<Vec<Enrollment>, ServiceError> {
        require_self(principal, student)?;
        let mut seen = Vec::with_capacity(courses.len());
        let mut out = Vec::with_capacity(courses.len());
        for &course in courses {
            if seen.contains(&course) {
                continue;
            }
            seen.push(course);
            self.courses
                .get_course(course)
                .await
                .or_not_found("course", course.value())?;

            let (enrollment, created) = self
                .enrollments
                .get_or_create_enrollment(student, course, self.clock.now())
                .await?;
            if !created {
                out.push(enrollment);
                continue;
            }
            info!(student = %student, course = %course, "student enrolled");
            self.trigger
                .dispatch(ProgressEvent::Enrolled { student, course })
                .await?;
            let refreshed = self.enrollments.find_enrollment(student, course).await?;
            out.push(refreshed.unwrap_or(enrollment));
        }
        Ok(out)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the enrollment does not exist and
    /// `Forbidden` for callers other than the student or course staff.
    pub async fn get_enrollment(
        &self,
        principal: &Principal,
        id: EnrollmentId,
    ) -> Result<Enrollment, ServiceError> {
        let enrollment = self
            .enrollments
            .get_enrollment(id)
            .await
            .or_not_found("enrollment", id.value())?;
        let course = self
            .courses
            .get_course(enrollment.course_id)
            .await
            .or_not_found("course", enrollment.course_id.value())?;
        require_reader(principal, enrollment.student, &course)?;
        Ok(enrollment)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless the caller edits the course.
    pub async fn list_course_enrollments(
        &self,
        principal: &Principal,
        course: CourseId,
    ) -> Result<Vec<Enrollment>, ServiceError> {
        let found = self
            .courses
            .get_course(course)
            .await
            .or_not_found("course", course.value())?;
        require_editor(principal, &found)?;
        Ok(self.enrollments.list_course_enrollments(course).await?)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` when listing another user's enrollments.
    pub async fn list_student_enrollments(
        &self,
        principal: &Principal,
        student: UserId,
    ) -> Result<Vec<Enrollment>, ServiceError> {
        require_self(principal, student)?;
        Ok(self.enrollments.list_student_enrollments(student).await?)
    }

    /// The stored progress of one enrollment alongside the current counts.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` when the student is not enrolled.
    pub async fn progress_report(
        &self,
        principal: &Principal,
        student: UserId,
        course: CourseId,
    ) -> Result<ProgressReport, ServiceError> {
        let found = self
            .courses
            .get_course(course)
            .await
            .or_not_found("course", course.value())?;
        require_reader(principal, student, &found)?;
        let enrollment = self
            .enrollments
            .find_enrollment(student, course)
            .await?
            .ok_or(ServiceError::NotFound("enrollment", course.value()))?;
        let counts = self.enrollments.progress_counts(student, course).await?;
        Ok(ProgressReport { enrollment, counts })
    }
}
