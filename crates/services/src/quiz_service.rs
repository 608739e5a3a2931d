use std::sync::Arc;

use lms_core::model::{Course, CourseId, LessonId, Principal, Question, Quiz, QuizDraft, QuizId};
use lms_core::recalc::{ContentChange, ProgressEvent};
use storage::repository::{CourseRepository, LessonRepository, QuizRepository};
use tracing::{info, warn};

use crate::Clock;
use crate::api::{ContentEdit, QuestionInput, QuizInput};
use crate::authz::require_editor;
use crate::error::{OrNotFound, ServiceError};
use crate::question_bank::{QuestionBank, Resolution, SyncPlan};
use crate::recalc_trigger::RecalcTrigger;

/// Quiz editing with question-bank sync.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    lessons: Arc<dyn LessonRepository>,
    quizzes: Arc<dyn QuizRepository>,
    bank: QuestionBank,
    trigger: RecalcTrigger,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        lessons: Arc<dyn LessonRepository>,
        quizzes: Arc<dyn QuizRepository>,
        bank: QuestionBank,
        trigger: RecalcTrigger,
    ) -> Self {
        Self {
            clock,
            courses,
            lessons,
            quizzes,
            bank,
            trigger,
        }
    }

    #[must_use]
    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    async fn course(&self, id: CourseId) -> Result<Course, ServiceError> {
        self.courses.get_course(id).await.or_not_found("course", id.value())
    }

    /// Lessons referenced by the quiz must exist in the quiz's course.
    async fn check_lessons(&self, draft: &QuizDraft) -> Result<(), ServiceError> {
        let refs: [Option<LessonId>; 2] = [draft.lesson_id, draft.prerequisite_lesson];
        for lesson_id in refs.into_iter().flatten() {
            let lesson = self
                .lessons
                .get_lesson(lesson_id)
                .await
                .or_not_found("lesson", lesson_id.value())?;
            if lesson.course_id != draft.course_id {
                return Err(ServiceError::Validation(format!(
                    "lesson {lesson_id} belongs to another course"
                )));
            }
        }
        Ok(())
    }

    /// Validate and check the submitted entries against the bank before any write.
    async fn plan_questions(
        &self,
        input: Option<Vec<QuestionInput>>,
    ) -> Result<Option<SyncPlan>, ServiceError> {
        match input.map(QuestionBank::validate).transpose()? {
            Some(entries) => Ok(Some(self.bank.plan(entries).await?)),
            None => Ok(None),
        }
    }

    async fn link_questions(&self, quiz: &mut Quiz, plan: SyncPlan) -> Result<(), ServiceError> {
        let resolved = self.bank.apply(plan).await?;
        quiz.relink_questions(resolved.into_iter().map(Resolution::id));
        self.quizzes
            .update_quiz(quiz)
            .await
            .or_not_found("quiz", quiz.id.value())
    }

    /// Drop a quiz whose creation failed after the insert.
    async fn discard(&self, id: QuizId) {
        if let Err(err) = self.quizzes.delete_quiz(id).await {
            warn!(quiz = %id, error = %err, "failed to remove partially created quiz");
        }
    }

    /// Create a quiz and, when given, link its questions.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless the caller edits the course,
    /// `Validation` for an invalid quiz or question, and `NotFound` for missing
    /// course or lessons.
    pub async fn create_quiz(
        &self,
        principal: &Principal,
        input: QuizInput,
    ) -> Result<ContentEdit<Quiz>, ServiceError> {
        let course = self.course(input.quiz.course_id).await?;
        require_editor(principal, &course)?;
        self.check_lessons(&input.quiz).await?;
        let validated = input.quiz.validate(self.clock.now())?;
        let plan = self.plan_questions(input.questions).await?;

        let mut quiz = self.quizzes.insert_new_quiz(validated).await?;
        if let Some(plan) = plan {
            if let Err(err) = self.link_questions(&mut quiz, plan).await {
                self.discard(quiz.id).await;
                return Err(err);
            }
        }
        info!(
            quiz = %quiz.id,
            course = %quiz.course_id,
            questions = quiz.question_ids.len(),
            "quiz created"
        );
        let fan_out = self
            .trigger
            .dispatch(ProgressEvent::ContentChanged {
                course: quiz.course_id,
                change: ContentChange::QuizCreated,
            })
            .await?;
        Ok(ContentEdit {
            value: quiz,
            fan_out,
        })
    }

    /// Update quiz metadata; `input.questions` replaces the linked set when present.
    ///
    /// Questions dropped from the set stay in the bank.
    ///
    /// # Errors
    ///
    /// Same as [`QuizService::create_quiz`].
    pub async fn update_quiz(
        &self,
        principal: &Principal,
        id: QuizId,
        input: QuizInput,
    ) -> Result<ContentEdit<Quiz>, ServiceError> {
        let mut quiz = self.get_quiz(id).await?;
        let course = self.course(quiz.course_id).await?;
        require_editor(principal, &course)?;
        if input.quiz.course_id != quiz.course_id {
            return Err(ServiceError::Validation(format!(
                "quiz {id} cannot move to course {}",
                input.quiz.course_id
            )));
        }
        self.check_lessons(&input.quiz).await?;
        quiz.apply_draft(input.quiz)?;
        let plan = self.plan_questions(input.questions).await?;

        match plan {
            Some(plan) => self.link_questions(&mut quiz, plan).await?,
            None => self
                .quizzes
                .update_quiz(&quiz)
                .await
                .or_not_found("quiz", id.value())?,
        }
        info!(
            quiz = %id,
            course = %quiz.course_id,
            questions = quiz.question_ids.len(),
            "quiz updated"
        );
        let fan_out = self
            .trigger
            .dispatch(ProgressEvent::ContentChanged {
                course: quiz.course_id,
                change: ContentChange::QuizUpdated,
            })
            .await?;
        Ok(ContentEdit {
            value: quiz,
            fan_out,
        })
    }

    /// Delete a quiz with its submissions and recalculate its course.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` unless the caller edits the course and
    /// `NotFound` if the quiz does not exist.
    pub async fn delete_quiz(
        &self,
        principal: &Principal,
        id: QuizId,
    ) -> Result<ContentEdit<QuizId>, ServiceError> {
        let quiz = self.get_quiz(id).await?;
        let course = self.course(quiz.course_id).await?;
        require_editor(principal, &course)?;

        self.quizzes
            .delete_quiz(id)
            .await
            .or_not_found("quiz", id.value())?;
        info!(quiz = %id, course = %quiz.course_id, "quiz deleted");
        let fan_out = self
            .trigger
            .dispatch(ProgressEvent::ContentChanged {
                course: quiz.course_id,
                change: ContentChange::QuizDeleted,
            })
            .await?;
        Ok(ContentEdit { value: id, fan_out })
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the quiz does not exist.
    pub async fn get_quiz(&self, id: QuizId) -> Result<Quiz, ServiceError> {
        self.quizzes.get_quiz(id).await.or_not_found("quiz", id.value())
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if repository access fails.
    pub async fn list_quizzes(&self, course: CourseId) -> Result<Vec<Quiz>, ServiceError> {
        Ok(self.quizzes.list_quizzes(course).await?)
    }

    /// The quiz's linked questions in link order.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the quiz does not exist.
    pub async fn quiz_questions(&self, id: QuizId) -> Result<Vec<Question>, ServiceError> {
        let quiz = self.get_quiz(id).await?;
        self.bank.load(&quiz.question_ids).await
    }
}
