use serde::{Deserialize, Serialize};

use crate::model::Percent;

/// Raw facts behind one enrollment's progress.
///
/// Storage backends fill these in; the formula lives here so every backend
/// rounds the same way.
///
/// ```
/// # use lms_core::progress::ProgressCounts;
/// let counts = ProgressCounts {
///     total_lessons: 2,
///     total_quizzes: 1,
///     completed_lessons: 1,
///     completed_quizzes: 1,
/// };
/// assert_eq!(counts.progress().to_string(), "66.67");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub total_lessons: u64,
    pub total_quizzes: u64,
    pub completed_lessons: u64,
    /// Distinct quizzes of the course with at least one submission.
    pub completed_quizzes: u64,
}

impl ProgressCounts {
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.total_lessons.saturating_add(self.total_quizzes)
    }

    #[must_use]
    pub fn completed_items(&self) -> u64 {
        self.completed_lessons.saturating_add(self.completed_quizzes)
    }

    /// Completed share of the course, `0.00` for an empty course.
    #[must_use]
    pub fn progress(&self) -> Percent {
        Percent::ratio(self.completed_items(), self.total_items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_course_is_zero() {
        let counts = ProgressCounts {
            total_lessons: 2,
            total_quizzes: 1,
            ..ProgressCounts::default()
        };
        assert_eq!(counts.progress(), Percent::ZERO);
        assert_eq!(counts.progress().to_string(), "0.00");
    }

    #[test]
    fn one_lesson_and_the_quiz_of_three_items() {
        let counts = ProgressCounts {
            total_lessons: 2,
            total_quizzes: 1,
            completed_lessons: 1,
            completed_quizzes: 1,
        };
        assert_eq!(counts.completed_items(), 2);
        assert_eq!(counts.total_items(), 3);
        assert_eq!(counts.progress().hundredths(), 6667);
    }

    #[test]
    fn empty_course_is_zero() {
        assert_eq!(ProgressCounts::default().progress(), Percent::ZERO);
    }

    #[test]
    fn stale_counts_are_clamped() {
        let counts = ProgressCounts {
            total_lessons: 1,
            total_quizzes: 0,
            completed_lessons: 3,
            completed_quizzes: 0,
        };
        assert_eq!(counts.progress(), Percent::HUNDRED);
    }
}
