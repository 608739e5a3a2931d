#![forbid(unsafe_code)]

pub mod access_service;
pub mod api;
pub mod app_services;
mod authz;
pub mod certificate_service;
pub mod collaborators;
pub mod course_service;
pub mod enrollment_service;
pub mod error;
pub mod lesson_service;
pub mod progress_service;
pub mod question_bank;
pub mod quiz_service;
pub mod recalc_trigger;
pub mod submission_service;

pub use lms_core::Clock;

pub use access_service::AccessService;
pub use api::{
    AccessResponse, ContentEdit, Curriculum, LessonProgressRequest, LessonProgressResponse,
    QuestionInput, QuizInput, SubmissionRequest, SubmissionResponse,
};
pub use app_services::AppServices;
pub use certificate_service::CertificateService;
pub use collaborators::Collaborators;
pub use course_service::CourseService;
pub use enrollment_service::{EnrollmentService, ProgressReport};
pub use error::{AppServicesError, ServiceError};
pub use lesson_service::LessonService;
pub use progress_service::LessonProgressService;
pub use question_bank::{QuestionBank, Resolution, SyncPlan, ValidatedEntries};
pub use quiz_service::QuizService;
pub use recalc_trigger::{FanOutReport, RecalcTrigger};
pub use submission_service::SubmissionService;
