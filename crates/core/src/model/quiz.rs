use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, QuestionId, QuizId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("time limit must be > 0 seconds")]
    InvalidTimeLimit,
}

/// Unvalidated quiz metadata. Questions are synced separately through the question bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDraft {
    pub course_id: CourseId,
    #[serde(default)]
    pub lesson_id: Option<LessonId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub time_limit_secs: Option<u32>,
    #[serde(default)]
    pub prerequisite_lesson: Option<LessonId>,
}

impl QuizDraft {
    /// # Errors
    ///
    /// Returns `QuizError` for an empty title or a zero time limit.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedQuiz, QuizError> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(QuizError::EmptyTitle);
        }
        if self.time_limit_secs == Some(0) {
            return Err(QuizError::InvalidTimeLimit);
        }
        Ok(ValidatedQuiz {
            course_id: self.course_id,
            lesson_id: self.lesson_id,
            title,
            description: self.description,
            time_limit_secs: self.time_limit_secs,
            prerequisite_lesson: self.prerequisite_lesson,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuiz {
    pub course_id: CourseId,
    pub lesson_id: Option<LessonId>,
    pub title: String,
    pub description: String,
    pub time_limit_secs: Option<u32>,
    pub prerequisite_lesson: Option<LessonId>,
    pub created_at: DateTime<Utc>,
}

impl ValidatedQuiz {
    #[must_use]
    pub fn assign_id(self, id: QuizId) -> Quiz {
        Quiz {
            id,
            course_id: self.course_id,
            lesson_id: self.lesson_id,
            title: self.title,
            description: self.description,
            time_limit_secs: self.time_limit_secs,
            prerequisite_lesson: self.prerequisite_lesson,
            question_ids: Vec::new(),
            created_at: self.created_at,
        }
    }
}

/// A quiz of a course, linking an ordered set of shared questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub course_id: CourseId,
    pub lesson_id: Option<LessonId>,
    pub title: String,
    pub description: String,
    pub time_limit_secs: Option<u32>,
    pub prerequisite_lesson: Option<LessonId>,
    pub question_ids: Vec<QuestionId>,
    pub created_at: DateTime<Utc>,
}

impl Quiz {
    /// Apply edited metadata, keeping identity and question links.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if the draft does not validate.
    pub fn apply_draft(&mut self, draft: QuizDraft) -> Result<(), QuizError> {
        let validated = draft.validate(self.created_at)?;
        self.lesson_id = validated.lesson_id;
        self.title = validated.title;
        self.description = validated.description;
        self.time_limit_secs = validated.time_limit_secs;
        self.prerequisite_lesson = validated.prerequisite_lesson;
        Ok(())
    }

    /// Replace the linked question set. Duplicates keep their first position.
    pub fn relink_questions(&mut self, ids: impl IntoIterator<Item = QuestionId>) {
        let mut linked: Vec<QuestionId> = Vec::new();
        for id in ids {
            if !linked.contains(&id) {
                linked.push(id);
            }
        }
        self.question_ids = linked;
    }

    #[must_use]
    pub fn links(&self, question: QuestionId) -> bool {
        self.question_ids.contains(&question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn quiz() -> Quiz {
        QuizDraft {
            course_id: CourseId::new(1),
            lesson_id: None,
            title: "Checkpoint".into(),
            description: String::new(),
            time_limit_secs: Some(600),
            prerequisite_lesson: None,
        }
        .validate(fixed_now())
        .unwrap()
        .assign_id(QuizId::new(5))
    }

    #[test]
    fn zero_time_limit_is_rejected() {
        let draft = QuizDraft {
            course_id: CourseId::new(1),
            lesson_id: None,
            title: "Timed".into(),
            description: String::new(),
            time_limit_secs: Some(0),
            prerequisite_lesson: None,
        };
        assert_eq!(
            draft.validate(fixed_now()).unwrap_err(),
            QuizError::InvalidTimeLimit
        );
    }

    #[test]
    fn relink_replaces_the_whole_set() {
        let mut q = quiz();
        q.relink_questions([QuestionId::new(1), QuestionId::new(2)]);
        q.relink_questions([QuestionId::new(3), QuestionId::new(2), QuestionId::new(3)]);
        assert_eq!(q.question_ids, vec![QuestionId::new(3), QuestionId::new(2)]);
        assert!(!q.links(QuestionId::new(1)));
    }
}
