use std::sync::Arc;

use lms_core::model::{Course, CourseId, Principal, UserId};
use storage::repository::{
    CourseRepository, LessonRepository, NewCourseRecord, QuizRepository, StorageError,
};
use tracing::info;

use crate::Clock;
use crate::api::Curriculum;
use crate::authz::{require_author, require_editor};
use crate::error::{OrNotFound, ServiceError};

/// Course lifecycle, instructor roster and curriculum listing.
#[derive(Clone)]
pub struct CourseService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    lessons: Arc<dyn LessonRepository>,
    quizzes: Arc<dyn QuizRepository>,
}

impl CourseService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        lessons: Arc<dyn LessonRepository>,
        quizzes: Arc<dyn QuizRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            lessons,
            quizzes,
        }
    }

    /// Create a course owned by the calling instructor.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` for students, `Validation` for a bad or
    /// already used title, and `Storage` for persistence failures.
    pub async fn create_course(
        &self,
        principal: &Principal,
        title: &str,
        description: &str,
    ) -> Result<Course, ServiceError> {
        require_author(principal)?;
        let now = self.clock.now();
        // Validates the title before touching storage.
        let draft = Course::new(
            CourseId::new(1),
            title,
            description,
            principal.user_id,
            now,
        )?;
        let course = self
            .courses
            .insert_new_course(NewCourseRecord {
                title: draft.title().to_owned(),
                description: draft.description().to_owned(),
                instructor: principal.user_id,
                created_at: now,
            })
            .await
            .map_err(|err| match err {
                StorageError::Conflict => {
                    ServiceError::Validation(format!("course title {:?} is taken", draft.title()))
                }
                other => other.into(),
            })?;
        info!(course = %course.id(), instructor = %principal.user_id, "course created");
        Ok(course)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the course does not exist.
    pub async fn get_course(&self, id: CourseId) -> Result<Course, ServiceError> {
        self.courses.get_course(id).await.or_not_found("course", id.value())
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if repository access fails.
    pub async fn list_courses(&self) -> Result<Vec<Course>, ServiceError> {
        Ok(self.courses.list_courses().await?)
    }

    /// Add a co-instructor. Returns `false` when the user already teaches the course.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless the caller can edit the course.
    pub async fn add_instructor(
        &self,
        principal: &Principal,
        course_id: CourseId,
        user: UserId,
    ) -> Result<bool, ServiceError> {
        let mut course = self.get_course(course_id).await?;
        require_editor(principal, &course)?;
        if !course.add_instructor(user) {
            return Ok(false);
        }
        self.courses.update_course(&course).await?;
        info!(course = %course_id, instructor = %user, "instructor added");
        Ok(true)
    }

    /// Remove an instructor. The last instructor cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless the caller can edit the course and
    /// `Validation` when removing the last instructor.
    pub async fn remove_instructor(
        &self,
        principal: &Principal,
        course_id: CourseId,
        user: UserId,
    ) -> Result<bool, ServiceError> {
        let mut course = self.get_course(course_id).await?;
        require_editor(principal, &course)?;
        if !course.remove_instructor(user)? {
            return Ok(false);
        }
        self.courses.update_course(&course).await?;
        info!(course = %course_id, instructor = %user, "instructor removed");
        Ok(true)
    }

    /// The course with its lessons in `order` and its quizzes.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the course does not exist.
    pub async fn curriculum(&self, id: CourseId) -> Result<Curriculum, ServiceError> {
        let course = self.get_course(id).await?;
        let lessons = self.lessons.list_lessons(id).await?;
        let quizzes = self.quizzes.list_quizzes(id).await?;
        Ok(Curriculum {
            course,
            lessons,
            quizzes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::time::fixed_clock;
    use storage::InMemoryRepository;

    fn service() -> CourseService {
        let repo = InMemoryRepository::new();
        CourseService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo),
        )
    }

    #[tokio::test]
    async fn instructors_create_and_share_courses() {
        let svc = service();
        let owner = Principal::instructor(UserId::new(1));
        let course = svc.create_course(&owner, " Rust ", "systems").await.unwrap();
        assert_eq!(course.title(), "Rust");

        assert!(svc.add_instructor(&owner, course.id(), UserId::new(2)).await.unwrap());
        assert!(!svc.add_instructor(&owner, course.id(), UserId::new(2)).await.unwrap());
        let stored = svc.get_course(course.id()).await.unwrap();
        assert!(stored.is_instructor(UserId::new(2)));

        let co = Principal::instructor(UserId::new(2));
        assert!(svc.remove_instructor(&co, course.id(), UserId::new(1)).await.unwrap());
        let err = svc
            .remove_instructor(&co, course.id(), UserId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn students_and_outsiders_are_rejected() {
        let svc = service();
        let err = svc
            .create_course(&Principal::student(UserId::new(5)), "Rust", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let course = svc
            .create_course(&Principal::instructor(UserId::new(1)), "Rust", "")
            .await
            .unwrap();
        let err = svc
            .add_instructor(&Principal::instructor(UserId::new(9)), course.id(), UserId::new(9))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn duplicate_titles_and_missing_courses() {
        let svc = service();
        let admin = Principal::admin(UserId::new(1));
        svc.create_course(&admin, "Rust", "").await.unwrap();
        let err = svc.create_course(&admin, "Rust", "").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref msg) if msg.contains("taken")));

        let err = svc.curriculum(CourseId::new(404)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("course", 404)));
    }
}
