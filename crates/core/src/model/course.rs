use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{CourseId, UserId};

pub const MAX_TITLE_LEN: usize = 255;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("course title must be at most 255 characters")]
    TitleTooLong,

    #[error("a course needs at least one instructor")]
    NoInstructors,

    #[error("cannot remove the last instructor of a course")]
    LastInstructor,
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// A course owning lessons and quizzes, co-owned by one or more instructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    id: CourseId,
    title: String,
    description: String,
    instructors: BTreeSet<UserId>,
    created_at: DateTime<Utc>,
}

impl Course {
    /// Creates a new course owned by a single instructor.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if the title is empty or too long.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        description: impl Into<String>,
        instructor: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        Self::from_persisted(
            id,
            title,
            description,
            BTreeSet::from([instructor]),
            created_at,
        )
    }

    /// Rehydrates a course from storage.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` if the stored values violate course invariants.
    pub fn from_persisted(
        id: CourseId,
        title: impl Into<String>,
        description: impl Into<String>,
        instructors: BTreeSet<UserId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CourseError> {
        let title = validate_title(title.into())?;
        if instructors.is_empty() {
            return Err(CourseError::NoInstructors);
        }
        Ok(Self {
            id,
            title,
            description: description.into(),
            instructors,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instructors(&self) -> impl Iterator<Item = UserId> + '_ {
        self.instructors.iter().copied()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn is_instructor(&self, user: UserId) -> bool {
        self.instructors.contains(&user)
    }

    /// Adds an instructor. Returns `false` when already present.
    pub fn add_instructor(&mut self, user: UserId) -> bool {
        self.instructors.insert(user)
    }

    /// Removes an instructor. Returns `false` when the user was not an instructor.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::LastInstructor` if `user` is the only instructor.
    pub fn remove_instructor(&mut self, user: UserId) -> Result<bool, CourseError> {
        if !self.instructors.contains(&user) {
            return Ok(false);
        }
        if self.instructors.len() == 1 {
            return Err(CourseError::LastInstructor);
        }
        Ok(self.instructors.remove(&user))
    }
}

fn validate_title(title: String) -> Result<String, CourseError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CourseError::EmptyTitle);
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(CourseError::TitleTooLong);
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn course() -> Course {
        Course::new(CourseId::new(1), "Rust 101", "", UserId::new(10), fixed_now()).unwrap()
    }

    #[test]
    fn title_is_trimmed_and_required() {
        let c = Course::new(CourseId::new(1), "  Rust  ", "", UserId::new(1), fixed_now()).unwrap();
        assert_eq!(c.title(), "Rust");

        let err = Course::new(CourseId::new(1), "   ", "", UserId::new(1), fixed_now()).unwrap_err();
        assert_eq!(err, CourseError::EmptyTitle);

        let long = "x".repeat(MAX_TITLE_LEN + 1);
        let err = Course::new(CourseId::new(1), long, "", UserId::new(1), fixed_now()).unwrap_err();
        assert_eq!(err, CourseError::TitleTooLong);
    }

    #[test]
    fn instructors_are_a_set() {
        let mut c = course();
        assert!(c.is_instructor(UserId::new(10)));
        assert!(c.add_instructor(UserId::new(11)));
        assert!(!c.add_instructor(UserId::new(11)));
        assert_eq!(c.instructors().count(), 2);
    }

    #[test]
    fn last_instructor_cannot_be_removed() {
        let mut c = course();
        assert_eq!(
            c.remove_instructor(UserId::new(10)),
            Err(CourseError::LastInstructor)
        );
        assert_eq!(c.remove_instructor(UserId::new(99)), Ok(false));

        c.add_instructor(UserId::new(11));
        assert_eq!(c.remove_instructor(UserId::new(10)), Ok(true));
        assert!(!c.is_instructor(UserId::new(10)));
    }
}
