//! Shared error types for the services crate.

use thiserror::Error;

use lms_core::grading::GradingError;
use lms_core::model::{
    CourseError, LessonError, PercentError, QuestionError, QuizError, QuizId, UserId,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::collaborators::CollaboratorError;

/// Errors emitted by every service in this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0} {1} not found")]
    NotFound(&'static str, u64),

    #[error("student {student} already submitted quiz {quiz}")]
    DuplicateSubmission { student: UserId, quiz: QuizId },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

macro_rules! validation_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for ServiceError {
                fn from(err: $source) -> Self {
                    ServiceError::Validation(err.to_string())
                }
            }
        )*
    };
}

validation_from!(
    CourseError,
    LessonError,
    QuizError,
    QuestionError,
    PercentError,
    GradingError,
    lms_core::Error,
);

/// Turns a bare `StorageError::NotFound` into a `ServiceError::NotFound` naming the entity.
pub(crate) trait OrNotFound<T> {
    fn or_not_found(self, entity: &'static str, id: u64) -> Result<T, ServiceError>;
}

impl<T> OrNotFound<T> for Result<T, StorageError> {
    fn or_not_found(self, entity: &'static str, id: u64) -> Result<T, ServiceError> {
        match self {
            Err(StorageError::NotFound) => Err(ServiceError::NotFound(entity, id)),
            other => other.map_err(ServiceError::from),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}
