use std::ops::Range;
use std::sync::Arc;

use lms_core::gate::AccessDecision;
use lms_core::model::{
    ConversionStatus, Course, CourseId, Lesson, LessonDraft, LessonError, LessonId, Principal,
};
use lms_core::recalc::{ContentChange, ProgressEvent};
use storage::repository::{CourseRepository, LessonRepository, QuizRepository, StorageError};
use tracing::info;

use crate::Clock;
use crate::access_service::AccessService;
use crate::api::ContentEdit;
use crate::authz::require_editor;
use crate::collaborators::{ConversionQueue, FileStore, MediaSource};
use crate::error::{OrNotFound, ServiceError};
use crate::recalc_trigger::{FanOutReport, RecalcTrigger};

/// Lesson order is unique within a course.
fn position_conflict(err: ServiceError, order: u32) -> ServiceError {
    match err {
        ServiceError::Storage(StorageError::Conflict) => {
            ServiceError::Validation(format!("another lesson already uses position {order}"))
        }
        other => other,
    }
}

/// Lesson editing, content files and gated media access.
#[derive(Clone)]
pub struct LessonService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    lessons: Arc<dyn LessonRepository>,
    quizzes: Arc<dyn QuizRepository>,
    files: Arc<dyn FileStore>,
    conversions: Arc<dyn ConversionQueue>,
    media: Arc<dyn MediaSource>,
    access: AccessService,
    trigger: RecalcTrigger,
}

impl LessonService {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        lessons: Arc<dyn LessonRepository>,
        quizzes: Arc<dyn QuizRepository>,
        files: Arc<dyn FileStore>,
        conversions: Arc<dyn ConversionQueue>,
        media: Arc<dyn MediaSource>,
        access: AccessService,
        trigger: RecalcTrigger,
    ) -> Self {
        Self {
            clock,
            courses,
            lessons,
            quizzes,
            files,
            conversions,
            media,
            access,
            trigger,
        }
    }

    async fn course(&self, id: CourseId) -> Result<Course, ServiceError> {
        self.courses.get_course(id).await.or_not_found("course", id.value())
    }

    /// The prerequisite quiz must exist and belong to the lesson's course.
    async fn check_prerequisite(&self, draft: &LessonDraft) -> Result<(), ServiceError> {
        let Some(pre) = draft.prerequisite else {
            return Ok(());
        };
        let quiz = self
            .quizzes
            .get_quiz(pre.quiz_id)
            .await
            .or_not_found("quiz", pre.quiz_id.value())?;
        if quiz.course_id != draft.course_id {
            return Err(ServiceError::Validation(format!(
                "prerequisite quiz {} belongs to another course",
                pre.quiz_id
            )));
        }
        Ok(())
    }

    async fn content_changed(
        &self,
        course: CourseId,
        change: ContentChange,
    ) -> Result<FanOutReport, ServiceError> {
        self.trigger
            .dispatch(ProgressEvent::ContentChanged { course, change })
            .await
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the lesson does not exist.
    pub async fn get_lesson(&self, id: LessonId) -> Result<Lesson, ServiceError> {
        self.lessons.get_lesson(id).await.or_not_found("lesson", id.value())
    }

    /// Lessons of a course in display order.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if repository access fails.
    pub async fn list_lessons(&self, course: CourseId) -> Result<Vec<Lesson>, ServiceError> {
        Ok(self.lessons.list_lessons(course).await?)
    }

    /// Add a lesson and recalculate every enrollment of its course.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless the caller edits the course,
    /// `Validation` for a bad draft and `NotFound` for missing references.
    pub async fn create_lesson(
        &self,
        principal: &Principal,
        draft: LessonDraft,
    ) -> Result<ContentEdit<Lesson>, ServiceError> {
        let course = self.course(draft.course_id).await?;
        require_editor(principal, &course)?;
        self.check_prerequisite(&draft).await?;

        let order = draft.order;
        let lesson = self
            .lessons
            .insert_new_lesson(draft.validate(self.clock.now())?)
            .await
            .map_err(|err| position_conflict(err.into(), order))?;
        info!(lesson = %lesson.id, course = %lesson.course_id, "lesson created");
        let fan_out = self
            .content_changed(lesson.course_id, ContentChange::LessonCreated)
            .await?;
        Ok(ContentEdit {
            value: lesson,
            fan_out,
        })
    }

    /// Replace a lesson's editable fields. Lessons cannot move between courses.
    ///
    /// # Errors
    ///
    /// Same as [`LessonService::create_lesson`].
    pub async fn update_lesson(
        &self,
        principal: &Principal,
        id: LessonId,
        draft: LessonDraft,
    ) -> Result<ContentEdit<Lesson>, ServiceError> {
        let mut lesson = self.get_lesson(id).await?;
        let course = self.course(lesson.course_id).await?;
        require_editor(principal, &course)?;
        if draft.course_id != lesson.course_id {
            return Err(ServiceError::Validation(format!(
                "lesson {id} cannot move to course {}",
                draft.course_id
            )));
        }
        self.check_prerequisite(&draft).await?;

        lesson.apply_draft(draft)?;
        self.lessons
            .update_lesson(&lesson)
            .await
            .or_not_found("lesson", id.value())
            .map_err(|err| position_conflict(err, lesson.order))?;
        info!(lesson = %id, course = %lesson.course_id, "lesson updated");
        let fan_out = self
            .content_changed(lesson.course_id, ContentChange::LessonUpdated)
            .await?;
        Ok(ContentEdit {
            value: lesson,
            fan_out,
        })
    }

    /// Delete a lesson with its progress rows and recalculate its course.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless the caller edits the course and
    /// `NotFound` if the lesson does not exist.
    pub async fn delete_lesson(
        &self,
        principal: &Principal,
        id: LessonId,
    ) -> Result<ContentEdit<LessonId>, ServiceError> {
        let lesson = self.get_lesson(id).await?;
        let course = self.course(lesson.course_id).await?;
        require_editor(principal, &course)?;

        self.lessons
            .delete_lesson(id)
            .await
            .or_not_found("lesson", id.value())?;
        info!(lesson = %id, course = %lesson.course_id, "lesson deleted");
        let fan_out = self
            .content_changed(lesson.course_id, ContentChange::LessonDeleted)
            .await?;
        Ok(ContentEdit { value: id, fan_out })
    }

    /// Store a content file for a lesson; office documents go to the conversion worker.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a blank file name, `Forbidden` unless
    /// the caller edits the course, and `Collaborator` if storing or queueing fails.
    pub async fn attach_file(
        &self,
        principal: &Principal,
        id: LessonId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Lesson, ServiceError> {
        if file_name.trim().is_empty() {
            return Err(LessonError::EmptyFileName.into());
        }
        let mut lesson = self.get_lesson(id).await?;
        let course = self.course(lesson.course_id).await?;
        require_editor(principal, &course)?;

        let file_ref = self.files.store(file_name, bytes).await?;
        let pending = lesson
            .attach_file(file_name, file_ref.as_str())?
            .status
            == ConversionStatus::Pending;
        self.lessons
            .update_lesson(&lesson)
            .await
            .or_not_found("lesson", id.value())?;
        if pending {
            self.conversions.enqueue(id, &file_ref).await?;
        }
        info!(lesson = %id, file = %file_ref.as_str(), pending, "lesson file attached");
        Ok(lesson)
    }

    /// Record the conversion worker's result for a lesson's file.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for a missing lesson and `Validation` when
    /// the lesson has no file.
    pub async fn record_conversion(
        &self,
        id: LessonId,
        status: ConversionStatus,
    ) -> Result<Lesson, ServiceError> {
        let lesson = self.get_lesson(id).await?;
        if lesson.content_file.is_none() {
            return Err(ServiceError::Validation(format!("lesson {id} has no file")));
        }
        let lesson = self
            .lessons
            .set_conversion_status(id, &status)
            .await
            .or_not_found("lesson", id.value())?;
        info!(lesson = %id, status = status.as_str(), "conversion recorded");
        Ok(lesson)
    }

    /// Read a byte range of the lesson's private video once the gate allows it.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` carrying the denial reason when the
    /// prerequisite is not met, `NotFound` when the lesson has no video, and
    /// `Collaborator` if the media source fails.
    pub async fn fetch_lesson_media(
        &self,
        principal: &Principal,
        id: LessonId,
        range: Range<u64>,
    ) -> Result<Vec<u8>, ServiceError> {
        if let AccessDecision::Denied(reason) = self.access.lesson_access(principal, id).await? {
            return Err(ServiceError::Forbidden(reason.to_string()));
        }
        let lesson = self.get_lesson(id).await?;
        let video = lesson
            .video_url
            .as_ref()
            .ok_or(ServiceError::NotFound("video", id.value()))?;
        let resource = video.path().trim_start_matches('/');
        Ok(self.media.fetch_range(resource, range).await?)
    }
}
