use serde::{Deserialize, Serialize};

use crate::model::{CompletionTransition, CourseId, UserId};

/// Kind of content edit that changes a course's item count or shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentChange {
    LessonCreated,
    LessonUpdated,
    LessonDeleted,
    QuizCreated,
    QuizUpdated,
    QuizDeleted,
}

/// Something happened that may move enrollment progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    LessonProgressSaved {
        student: UserId,
        course: CourseId,
        transition: CompletionTransition,
    },
    SubmissionCreated {
        student: UserId,
        course: CourseId,
    },
    ContentChanged {
        course: CourseId,
        change: ContentChange,
    },
    Enrolled {
        student: UserId,
        course: CourseId,
    },
}

/// Which enrollments must be recalculated for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcScope {
    Enrollment { student: UserId, course: CourseId },
    Course(CourseId),
    Nothing,
}

impl ProgressEvent {
    #[must_use]
    pub fn scope(&self) -> RecalcScope {
        match *self {
            ProgressEvent::LessonProgressSaved {
                transition: CompletionTransition::Unchanged,
                ..
            } => RecalcScope::Nothing,
            ProgressEvent::LessonProgressSaved {
                student, course, ..
            }
            | ProgressEvent::SubmissionCreated { student, course }
            | ProgressEvent::Enrolled { student, course } => {
                RecalcScope::Enrollment { student, course }
            }
            ProgressEvent::ContentChanged { course, .. } => RecalcScope::Course(course),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STUDENT: UserId = UserId::new(1);
    const COURSE: CourseId = CourseId::new(2);

    #[test]
    fn completion_changes_recalculate_one_enrollment() {
        for transition in [CompletionTransition::Completed, CompletionTransition::Reopened] {
            let event = ProgressEvent::LessonProgressSaved {
                student: STUDENT,
                course: COURSE,
                transition,
            };
            assert_eq!(
                event.scope(),
                RecalcScope::Enrollment {
                    student: STUDENT,
                    course: COURSE
                }
            );
        }
    }

    #[test]
    fn unchanged_save_does_nothing() {
        let event = ProgressEvent::LessonProgressSaved {
            student: STUDENT,
            course: COURSE,
            transition: CompletionTransition::Unchanged,
        };
        assert_eq!(event.scope(), RecalcScope::Nothing);
    }

    #[test]
    fn content_edits_fan_out_to_the_course() {
        let event = ProgressEvent::ContentChanged {
            course: COURSE,
            change: ContentChange::LessonDeleted,
        };
        assert_eq!(event.scope(), RecalcScope::Course(COURSE));
    }
}
