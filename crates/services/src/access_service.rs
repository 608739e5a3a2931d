use std::sync::Arc;

use lms_core::gate::{self, AccessDecision};
use lms_core::model::{LessonId, Principal, QuizId};
use storage::repository::{
    CourseRepository, LessonProgressRepository, LessonRepository, QuizRepository,
    SubmissionRepository,
};

use crate::api::AccessResponse;
use crate::error::{OrNotFound, ServiceError};

/// Answers "may this principal open that lesson or quiz yet?".
///
/// A denial is a normal result carrying its reason, never an error.
#[derive(Clone)]
pub struct AccessService {
    courses: Arc<dyn CourseRepository>,
    lessons: Arc<dyn LessonRepository>,
    quizzes: Arc<dyn QuizRepository>,
    submissions: Arc<dyn SubmissionRepository>,
    lesson_progress: Arc<dyn LessonProgressRepository>,
}

impl AccessService {
    #[must_use]
    pub fn new(
        courses: Arc<dyn CourseRepository>,
        lessons: Arc<dyn LessonRepository>,
        quizzes: Arc<dyn QuizRepository>,
        submissions: Arc<dyn SubmissionRepository>,
        lesson_progress: Arc<dyn LessonProgressRepository>,
    ) -> Self {
        Self {
            courses,
            lessons,
            quizzes,
            submissions,
            lesson_progress,
        }
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the lesson or its course is missing.
    pub async fn lesson_access(
        &self,
        principal: &Principal,
        lesson_id: LessonId,
    ) -> Result<AccessDecision, ServiceError> {
        let lesson = self
            .lessons
            .get_lesson(lesson_id)
            .await
            .or_not_found("lesson", lesson_id.value())?;
        let course = self
            .courses
            .get_course(lesson.course_id)
            .await
            .or_not_found("course", lesson.course_id.value())?;
        if principal.bypasses_gates(&course) {
            return Ok(AccessDecision::Allowed);
        }

        let submission = match lesson.prerequisite {
            Some(pre) => {
                self.submissions
                    .find_submission(principal.user_id, pre.quiz_id)
                    .await?
            }
            None => None,
        };
        Ok(gate::lesson_access(&lesson, submission.as_ref()))
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the quiz or its course is missing.
    pub async fn quiz_access(
        &self,
        principal: &Principal,
        quiz_id: QuizId,
    ) -> Result<AccessDecision, ServiceError> {
        let quiz = self
            .quizzes
            .get_quiz(quiz_id)
            .await
            .or_not_found("quiz", quiz_id.value())?;
        let course = self
            .courses
            .get_course(quiz.course_id)
            .await
            .or_not_found("course", quiz.course_id.value())?;
        if principal.bypasses_gates(&course) {
            return Ok(AccessDecision::Allowed);
        }

        let progress = match quiz.prerequisite_lesson {
            Some(lesson) => {
                self.lesson_progress
                    .get_lesson_progress(principal.user_id, lesson)
                    .await?
            }
            None => None,
        };
        Ok(gate::quiz_access(&quiz, progress.as_ref()))
    }

    /// # Errors
    ///
    /// See [`AccessService::lesson_access`].
    pub async fn check_lesson(
        &self,
        principal: &Principal,
        lesson_id: LessonId,
    ) -> Result<AccessResponse, ServiceError> {
        Ok(self.lesson_access(principal, lesson_id).await?.into())
    }

    /// # Errors
    ///
    /// See [`AccessService::quiz_access`].
    pub async fn check_quiz(
        &self,
        principal: &Principal,
        quiz_id: QuizId,
    ) -> Result<AccessResponse, ServiceError> {
        Ok(self.quiz_access(principal, quiz_id).await?.into())
    }
}
