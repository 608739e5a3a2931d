mod certificate;
mod course;
mod enrollment;
mod ids;
mod lesson;
mod percent;
mod principal;
mod question;
mod quiz;
mod submission;

pub use ids::{
    CertificateId, CourseId, EnrollmentId, LessonId, OptionId, ParseIdError, QuestionId, QuizId,
    SubmissionId, UserId,
};
pub use percent::{Percent, PercentError};

pub use certificate::{Certificate, NewCertificate};
pub use course::{Course, CourseError};
pub use enrollment::{CompletionTransition, Enrollment, LessonProgress};
pub use lesson::{
    ContentFile, ConversionStatus, Lesson, LessonDraft, LessonError, QuizPrerequisite,
    ValidatedLesson,
};
pub use principal::{Principal, Role};
pub use question::{
    AnswerOption, OptionDraft, OptionSyncPlan, Question, QuestionDraft, QuestionError, QuestionKey,
    QuestionType, ValidatedQuestion,
};
pub use quiz::{Quiz, QuizDraft, QuizError, ValidatedQuiz};
pub use submission::{GradedSubmission, StudentAnswer, Submission};
