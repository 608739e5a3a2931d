use thiserror::Error;

use crate::grading::GradingError;
use crate::model::{CourseError, LessonError, PercentError, QuestionError, QuizError};

/// Any domain validation failure raised by this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Percent(#[from] PercentError),
    #[error(transparent)]
    Grading(#[from] GradingError),
}
