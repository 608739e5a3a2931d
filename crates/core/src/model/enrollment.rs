use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, EnrollmentId, LessonId, UserId};
use crate::model::percent::Percent;

//
// ─── ENROLLMENT ────────────────────────────────────────────────────────────────
//

/// A student's standing in one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student: UserId,
    pub course_id: CourseId,
    pub progress: Percent,
    pub completed: bool,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    #[must_use]
    pub fn new(
        id: EnrollmentId,
        student: UserId,
        course_id: CourseId,
        enrolled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            student,
            course_id,
            progress: Percent::ZERO,
            completed: false,
            enrolled_at,
            completed_at: None,
        }
    }

    /// Store a freshly computed progress value.
    ///
    /// Reaching 100% marks the enrollment completed (keeping the first completion time);
    /// dropping below 100% clears it. Returns `true` if anything changed.
    pub fn apply_progress(&mut self, progress: Percent, now: DateTime<Utc>) -> bool {
        let before = (self.progress, self.completed);
        self.progress = progress;
        if progress.is_complete() {
            self.completed = true;
            self.completed_at.get_or_insert(now);
        } else {
            self.completed = false;
            self.completed_at = None;
        }
        before != (self.progress, self.completed)
    }
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// What changed when a lesson-progress row was saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTransition {
    Completed,
    Reopened,
    Unchanged,
}

/// Per (student, lesson) completion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub student: UserId,
    pub lesson_id: LessonId,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    #[must_use]
    pub fn mark(student: UserId, lesson_id: LessonId, is_completed: bool, now: DateTime<Utc>) -> Self {
        Self {
            student,
            lesson_id,
            is_completed,
            completed_at: is_completed.then_some(now),
        }
    }

    /// Merge a new completion flag into the stored row, keeping the original
    /// completion time when the lesson was already done.
    #[must_use]
    pub fn merged_with(self, previous: Option<&LessonProgress>) -> Self {
        match previous {
            Some(prev) if prev.is_completed && self.is_completed => Self {
                completed_at: prev.completed_at.or(self.completed_at),
                ..self
            },
            _ => self,
        }
    }

    /// Classify the change from `previous` (absent means "not completed").
    #[must_use]
    pub fn transition_from(&self, previous: Option<&LessonProgress>) -> CompletionTransition {
        let was_completed = previous.is_some_and(|p| p.is_completed);
        match (was_completed, self.is_completed) {
            (false, true) => CompletionTransition::Completed,
            (true, false) => CompletionTransition::Reopened,
            _ => CompletionTransition::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn full_progress_completes_and_partial_reopens() {
        let now = fixed_now();
        let mut e = Enrollment::new(EnrollmentId::new(1), UserId::new(2), CourseId::new(3), now);

        assert!(e.apply_progress(Percent::HUNDRED, now));
        assert!(e.completed);
        assert_eq!(e.completed_at, Some(now));

        // Same value later keeps the first completion time.
        assert!(!e.apply_progress(Percent::HUNDRED, now + Duration::days(1)));
        assert_eq!(e.completed_at, Some(now));

        assert!(e.apply_progress(Percent::ratio(3, 4), now));
        assert!(!e.completed);
        assert_eq!(e.completed_at, None);
    }

    #[test]
    fn transitions_are_classified() {
        let now = fixed_now();
        let done = LessonProgress::mark(UserId::new(1), LessonId::new(1), true, now);
        let undone = LessonProgress::mark(UserId::new(1), LessonId::new(1), false, now);

        assert_eq!(done.transition_from(None), CompletionTransition::Completed);
        assert_eq!(undone.transition_from(None), CompletionTransition::Unchanged);
        assert_eq!(done.transition_from(Some(&done)), CompletionTransition::Unchanged);
        assert_eq!(undone.transition_from(Some(&done)), CompletionTransition::Reopened);
        assert_eq!(undone.completed_at, None);
    }

    #[test]
    fn re_marking_keeps_first_completion_time() {
        let first = LessonProgress::mark(UserId::new(1), LessonId::new(1), true, fixed_now());
        let again = LessonProgress::mark(
            UserId::new(1),
            LessonId::new(1),
            true,
            fixed_now() + Duration::hours(2),
        )
        .merged_with(Some(&first));
        assert_eq!(again.completed_at, Some(fixed_now()));
    }
}
