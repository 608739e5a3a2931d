use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::ids::{CourseId, LessonId, QuizId};
use crate::model::percent::Percent;

/// File extensions that the document worker converts to PDF.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &["ppt", "pptx", "doc", "docx", "xls", "xlsx"];

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("invalid video url: {0}")]
    InvalidVideoUrl(String),

    #[error("content file name cannot be empty")]
    EmptyFileName,
}

//
// ─── PREREQUISITE / CONTENT FILE ───────────────────────────────────────────────
//

/// Gate a lesson behind a minimum score on a quiz of the same course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizPrerequisite {
    pub quiz_id: QuizId,
    pub min_score: Percent,
}

/// Lifecycle of the asynchronous document conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionStatus {
    NotRequired,
    Pending,
    Ready { output_ref: String },
    Failed { reason: String },
}

impl ConversionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::NotRequired => "not_required",
            ConversionStatus::Pending => "pending",
            ConversionStatus::Ready { .. } => "ready",
            ConversionStatus::Failed { .. } => "failed",
        }
    }
}

/// A file attached to a lesson through the external file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFile {
    pub file_ref: String,
    pub status: ConversionStatus,
}

impl ContentFile {
    /// Whether a file with this name is handed to the conversion worker.
    #[must_use]
    pub fn needs_conversion(file_name: &str) -> bool {
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()))
    }
}

//
// ─── LESSON TYPES ──────────────────────────────────────────────────────────────
//

/// Unvalidated lesson input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDraft {
    pub course_id: CourseId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub prerequisite: Option<QuizPrerequisite>,
}

impl LessonDraft {
    /// Validate the draft into a lesson that only lacks an id.
    ///
    /// # Errors
    ///
    /// Returns `LessonError` for an empty title or unparsable video url.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedLesson, LessonError> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        let video_url = parse_video_url(self.video_url)?;

        Ok(ValidatedLesson {
            course_id: self.course_id,
            title,
            content: self.content,
            video_url,
            order: self.order,
            prerequisite: self.prerequisite,
            created_at: now,
        })
    }
}

fn parse_video_url(raw: Option<String>) -> Result<Option<Url>, LessonError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => Url::parse(raw.trim())
            .map(Some)
            .map_err(|e| LessonError::InvalidVideoUrl(e.to_string())),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLesson {
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub video_url: Option<Url>,
    pub order: u32,
    pub prerequisite: Option<QuizPrerequisite>,
    pub created_at: DateTime<Utc>,
}

impl ValidatedLesson {
    #[must_use]
    pub fn assign_id(self, id: LessonId) -> Lesson {
        Lesson {
            id,
            course_id: self.course_id,
            title: self.title,
            content: self.content,
            video_url: self.video_url,
            order: self.order,
            prerequisite: self.prerequisite,
            content_file: None,
            created_at: self.created_at,
        }
    }
}

/// A lesson of a course, listed by `order` then id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub course_id: CourseId,
    pub title: String,
    pub content: String,
    pub video_url: Option<Url>,
    pub order: u32,
    pub prerequisite: Option<QuizPrerequisite>,
    pub content_file: Option<ContentFile>,
    pub created_at: DateTime<Utc>,
}

impl Lesson {
    /// Apply an edited draft, keeping identity, creation time and attached file.
    ///
    /// # Errors
    ///
    /// Returns `LessonError` if the draft does not validate.
    pub fn apply_draft(&mut self, draft: LessonDraft) -> Result<(), LessonError> {
        let validated = draft.validate(self.created_at)?;
        self.title = validated.title;
        self.content = validated.content;
        self.video_url = validated.video_url;
        self.order = validated.order;
        self.prerequisite = validated.prerequisite;
        Ok(())
    }

    /// Attach a stored file, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyFileName` when `file_name` is blank.
    pub fn attach_file(
        &mut self,
        file_name: &str,
        file_ref: impl Into<String>,
    ) -> Result<&ContentFile, LessonError> {
        if file_name.trim().is_empty() {
            return Err(LessonError::EmptyFileName);
        }
        let status = if ContentFile::needs_conversion(file_name) {
            ConversionStatus::Pending
        } else {
            ConversionStatus::NotRequired
        };
        Ok(self.content_file.insert(ContentFile {
            file_ref: file_ref.into(),
            status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft() -> LessonDraft {
        LessonDraft {
            course_id: CourseId::new(1),
            title: " Ownership ".into(),
            content: "Moves and borrows".into(),
            video_url: Some("https://videos.example.com/ownership.mp4".into()),
            order: 1,
            prerequisite: None,
        }
    }

    #[test]
    fn validate_trims_title_and_parses_url() {
        let lesson = draft().validate(fixed_now()).unwrap().assign_id(LessonId::new(3));
        assert_eq!(lesson.title, "Ownership");
        assert_eq!(
            lesson.video_url.as_ref().map(Url::as_str),
            Some("https://videos.example.com/ownership.mp4")
        );
        assert!(lesson.content_file.is_none());
    }

    #[test]
    fn blank_video_url_is_treated_as_absent() {
        let mut d = draft();
        d.video_url = Some("   ".into());
        assert!(d.validate(fixed_now()).unwrap().video_url.is_none());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let mut d = draft();
        d.title = " ".into();
        assert_eq!(d.validate(fixed_now()).unwrap_err(), LessonError::EmptyTitle);

        let mut d = draft();
        d.video_url = Some("not a url".into());
        assert!(matches!(
            d.validate(fixed_now()),
            Err(LessonError::InvalidVideoUrl(_))
        ));
    }

    #[test]
    fn office_documents_need_conversion() {
        assert!(ContentFile::needs_conversion("slides.PPTX"));
        assert!(ContentFile::needs_conversion("notes.doc"));
        assert!(!ContentFile::needs_conversion("handout.pdf"));
        assert!(!ContentFile::needs_conversion("README"));
    }

    #[test]
    fn attach_file_sets_conversion_status() {
        let mut lesson = draft().validate(fixed_now()).unwrap().assign_id(LessonId::new(1));
        let file = lesson.attach_file("deck.pptx", "files/1").unwrap();
        assert_eq!(file.status, ConversionStatus::Pending);

        let file = lesson.attach_file("deck.pdf", "files/2").unwrap();
        assert_eq!(file.status, ConversionStatus::NotRequired);
        assert_eq!(lesson.content_file.unwrap().file_ref, "files/2");
    }
}
