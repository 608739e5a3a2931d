use std::sync::Arc;

use lms_core::grading::grade_submission;
use lms_core::model::{Principal, QuizId, Submission, SubmissionId};
use storage::repository::{
    CompletionPersistence, CourseRepository, QuestionRepository, QuizRepository, StorageError,
    SubmissionRepository,
};
use tracing::info;

use crate::Clock;
use crate::api::{SubmissionRequest, SubmissionResponse};
use crate::authz::require_reader;
use crate::error::{OrNotFound, ServiceError};

/// Grades quiz attempts once and stores them with the resulting progress.
#[derive(Clone)]
pub struct SubmissionService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    quizzes: Arc<dyn QuizRepository>,
    questions: Arc<dyn QuestionRepository>,
    submissions: Arc<dyn SubmissionRepository>,
    completions: Arc<dyn CompletionPersistence>,
}

impl SubmissionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        quizzes: Arc<dyn QuizRepository>,
        questions: Arc<dyn QuestionRepository>,
        submissions: Arc<dyn SubmissionRepository>,
        completions: Arc<dyn CompletionPersistence>,
    ) -> Self {
        Self {
            clock,
            courses,
            quizzes,
            questions,
            submissions,
            completions,
        }
    }

    /// Grade and store the caller's only attempt at a quiz.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::DuplicateSubmission` if the caller already submitted,
    /// `Validation` for answers outside the quiz or answering a question twice,
    /// and `NotFound` for a missing quiz.
    pub async fn submit(
        &self,
        principal: &Principal,
        request: SubmissionRequest,
    ) -> Result<SubmissionResponse, ServiceError> {
        let student = principal.user_id;
        let duplicate = ServiceError::DuplicateSubmission {
            student,
            quiz: request.quiz_id,
        };
        let quiz = self
            .quizzes
            .get_quiz(request.quiz_id)
            .await
            .or_not_found("quiz", request.quiz_id.value())?;
        if self
            .submissions
            .find_submission(student, quiz.id)
            .await?
            .is_some()
        {
            return Err(duplicate);
        }

        let questions = self.questions.get_questions(&quiz.question_ids).await?;
        let graded = grade_submission(
            &quiz,
            &questions,
            student,
            &request.answers,
            self.clock.now(),
        )?;

        let recorded = match self
            .completions
            .record_submission(graded, self.clock.now())
            .await
        {
            Ok(recorded) => recorded,
            // A concurrent attempt won the unique (student, quiz) slot.
            Err(StorageError::Conflict) => return Err(duplicate),
            Err(StorageError::NotFound) => {
                return Err(ServiceError::NotFound("quiz", quiz.id.value()));
            }
            Err(err) => return Err(err.into()),
        };

        let submission = &recorded.submission;
        info!(
            student = %student,
            quiz = %quiz.id,
            score = submission.score,
            max_score = submission.max_score,
            percentage = %submission.percentage,
            "quiz submitted"
        );
        Ok(SubmissionResponse::new(
            submission,
            recorded.enrollment.map(|e| e.progress),
        ))
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the submission does not exist and
    /// `Forbidden` for callers other than its student or course staff.
    pub async fn get_submission(
        &self,
        principal: &Principal,
        id: SubmissionId,
    ) -> Result<Submission, ServiceError> {
        let submission = self
            .submissions
            .get_submission(id)
            .await
            .or_not_found("submission", id.value())?;
        let quiz = self
            .quizzes
            .get_quiz(submission.quiz_id)
            .await
            .or_not_found("quiz", submission.quiz_id.value())?;
        let course = self
            .courses
            .get_course(quiz.course_id)
            .await
            .or_not_found("course", quiz.course_id.value())?;
        require_reader(principal, submission.student, &course)?;
        Ok(submission)
    }

    /// The caller's submission for a quiz, if any.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if repository access fails.
    pub async fn find_own(
        &self,
        principal: &Principal,
        quiz: QuizId,
    ) -> Result<Option<Submission>, ServiceError> {
        Ok(self
            .submissions
            .find_submission(principal.user_id, quiz)
            .await?)
    }
}
