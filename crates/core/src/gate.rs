use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Lesson, LessonId, LessonProgress, Percent, Quiz, QuizId, Submission};

/// Why a student may not open a lesson or quiz yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    QuizNotSubmitted {
        quiz_id: QuizId,
        required: Percent,
    },
    ScoreBelowThreshold {
        quiz_id: QuizId,
        required: Percent,
        achieved: Percent,
    },
    LessonNotCompleted {
        lesson_id: LessonId,
    },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::QuizNotSubmitted { quiz_id, required } => write!(
                f,
                "submit quiz {quiz_id} with at least {required}% to unlock this lesson"
            ),
            DenialReason::ScoreBelowThreshold {
                quiz_id,
                required,
                achieved,
            } => write!(
                f,
                "quiz {quiz_id} requires at least {required}%, you scored {achieved}%"
            ),
            DenialReason::LessonNotCompleted { lesson_id } => {
                write!(f, "complete lesson {lesson_id} to unlock this quiz")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    Allowed,
    Denied(DenialReason),
}

impl AccessDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&DenialReason> {
        match self {
            AccessDecision::Allowed => None,
            AccessDecision::Denied(reason) => Some(reason),
        }
    }
}

/// Check a lesson's quiz prerequisite against the student's submission for that quiz.
///
/// The caller passes the submission for `lesson.prerequisite.quiz_id`, if any.
#[must_use]
pub fn lesson_access(lesson: &Lesson, submission: Option<&Submission>) -> AccessDecision {
    let Some(prerequisite) = lesson.prerequisite else {
        return AccessDecision::Allowed;
    };
    let submission = submission.filter(|s| s.quiz_id == prerequisite.quiz_id);
    match submission {
        None => AccessDecision::Denied(DenialReason::QuizNotSubmitted {
            quiz_id: prerequisite.quiz_id,
            required: prerequisite.min_score,
        }),
        Some(s) if s.percentage >= prerequisite.min_score => AccessDecision::Allowed,
        Some(s) => AccessDecision::Denied(DenialReason::ScoreBelowThreshold {
            quiz_id: prerequisite.quiz_id,
            required: prerequisite.min_score,
            achieved: s.percentage,
        }),
    }
}

/// Check a quiz's lesson prerequisite against the student's progress row for that lesson.
#[must_use]
pub fn quiz_access(quiz: &Quiz, progress: Option<&LessonProgress>) -> AccessDecision {
    let Some(lesson_id) = quiz.prerequisite_lesson else {
        return AccessDecision::Allowed;
    };
    let done = progress.is_some_and(|p| p.lesson_id == lesson_id && p.is_completed);
    if done {
        AccessDecision::Allowed
    } else {
        AccessDecision::Denied(DenialReason::LessonNotCompleted { lesson_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CourseId, LessonDraft, QuizDraft, QuizPrerequisite, SubmissionId, UserId,
    };
    use crate::time::fixed_now;

    fn gated_lesson(min: u8) -> Lesson {
        LessonDraft {
            course_id: CourseId::new(1),
            title: "Advanced traits".into(),
            content: String::new(),
            video_url: None,
            order: 2,
            prerequisite: Some(QuizPrerequisite {
                quiz_id: QuizId::new(4),
                min_score: Percent::whole(min).unwrap(),
            }),
        }
        .validate(fixed_now())
        .unwrap()
        .assign_id(LessonId::new(2))
    }

    fn submission(percent: u8) -> Submission {
        Submission {
            id: SubmissionId::new(1),
            quiz_id: QuizId::new(4),
            student: UserId::new(9),
            score: u32::from(percent),
            max_score: 100,
            percentage: Percent::whole(percent).unwrap(),
            answers: Vec::new(),
            submitted_at: fixed_now(),
        }
    }

    #[test]
    fn forty_percent_against_fifty_is_denied_with_reason() {
        let decision = lesson_access(&gated_lesson(50), Some(&submission(40)));
        assert_eq!(
            decision,
            AccessDecision::Denied(DenialReason::ScoreBelowThreshold {
                quiz_id: QuizId::new(4),
                required: Percent::whole(50).unwrap(),
                achieved: Percent::whole(40).unwrap(),
            })
        );
        let message = decision.reason().unwrap().to_string();
        assert!(message.contains("quiz 4"));
        assert!(message.contains("50.00%"));
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(lesson_access(&gated_lesson(50), Some(&submission(50))).is_allowed());
    }

    #[test]
    fn missing_submission_names_the_quiz() {
        assert_eq!(
            lesson_access(&gated_lesson(50), None),
            AccessDecision::Denied(DenialReason::QuizNotSubmitted {
                quiz_id: QuizId::new(4),
                required: Percent::whole(50).unwrap(),
            })
        );
    }

    #[test]
    fn ungated_lesson_is_open() {
        let mut lesson = gated_lesson(50);
        lesson.prerequisite = None;
        assert!(lesson_access(&lesson, None).is_allowed());
    }

    #[test]
    fn quiz_needs_its_lesson_completed() {
        let quiz = QuizDraft {
            course_id: CourseId::new(1),
            lesson_id: None,
            title: "Final".into(),
            description: String::new(),
            time_limit_secs: None,
            prerequisite_lesson: Some(LessonId::new(3)),
        }
        .validate(fixed_now())
        .unwrap()
        .assign_id(QuizId::new(8));

        let open = LessonProgress::mark(UserId::new(9), LessonId::new(3), false, fixed_now());
        assert_eq!(
            quiz_access(&quiz, Some(&open)),
            AccessDecision::Denied(DenialReason::LessonNotCompleted {
                lesson_id: LessonId::new(3)
            })
        );

        let done = LessonProgress::mark(UserId::new(9), LessonId::new(3), true, fixed_now());
        assert!(quiz_access(&quiz, Some(&done)).is_allowed());
    }
}
