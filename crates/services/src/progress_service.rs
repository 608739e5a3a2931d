use std::sync::Arc;

use lms_core::model::{LessonId, LessonProgress, Principal};
use storage::repository::{CompletionPersistence, LessonProgressRepository};
use tracing::info;

use crate::Clock;
use crate::api::{LessonProgressRequest, LessonProgressResponse};
use crate::error::{OrNotFound, ServiceError};

/// Students marking lessons done or undone.
///
/// The save and the enrollment recalculation it causes commit together.
#[derive(Clone)]
pub struct LessonProgressService {
    clock: Clock,
    lesson_progress: Arc<dyn LessonProgressRepository>,
    completions: Arc<dyn CompletionPersistence>,
}

impl LessonProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        lesson_progress: Arc<dyn LessonProgressRepository>,
        completions: Arc<dyn CompletionPersistence>,
    ) -> Self {
        Self {
            clock,
            lesson_progress,
            completions,
        }
    }

    /// Upsert the caller's progress row for a lesson.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the lesson does not exist.
    pub async fn save(
        &self,
        principal: &Principal,
        request: LessonProgressRequest,
    ) -> Result<LessonProgressResponse, ServiceError> {
        let now = self.clock.now();
        let progress = LessonProgress::mark(
            principal.user_id,
            request.lesson_id,
            request.is_completed,
            now,
        );
        let recorded = self
            .completions
            .record_lesson_progress(progress, now)
            .await
            .or_not_found("lesson", request.lesson_id.value())?;

        let enrollment_progress = recorded.enrollment.as_ref().map(|e| e.progress);
        info!(
            student = %principal.user_id,
            lesson = %request.lesson_id,
            transition = ?recorded.transition,
            progress = ?enrollment_progress,
            "lesson progress saved"
        );
        Ok(LessonProgressResponse {
            lesson_id: recorded.progress.lesson_id,
            is_completed: recorded.progress.is_completed,
            completed_at: recorded.progress.completed_at,
            transition: recorded.transition,
            progress: enrollment_progress,
        })
    }

    /// The caller's progress row for a lesson, if any.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if repository access fails.
    pub async fn get(
        &self,
        principal: &Principal,
        lesson: LessonId,
    ) -> Result<Option<LessonProgress>, ServiceError> {
        Ok(self
            .lesson_progress
            .get_lesson_progress(principal.user_id, lesson)
            .await?)
    }
}
