use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_ids {
    ($(
        $(#[$meta:meta])*
        $name:ident
    ),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(u64);

            impl $name {
                #[must_use]
                pub const fn new(id: u64) -> Self {
                    Self(id)
                }

                /// Returns the underlying u64 value
                #[must_use]
                pub const fn value(&self) -> u64 {
                    self.0
                }
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = ParseIdError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    s.trim()
                        .parse::<u64>()
                        .map(Self::new)
                        .map_err(|_| ParseIdError {
                            kind: stringify!($name),
                        })
                }
            }
        )*
    };
}

define_ids! {
    /// Identifier of an authenticated user (student, instructor or admin).
    UserId,
    /// Identifier of a Course
    CourseId,
    /// Identifier of a Lesson
    LessonId,
    /// Identifier of a Quiz
    QuizId,
    /// Identifier of a Question in the shared question bank
    QuestionId,
    /// Identifier of an answer Option belonging to one Question
    OptionId,
    /// Identifier of an Enrollment
    EnrollmentId,
    /// Identifier of a Submission
    SubmissionId,
    /// Identifier of a Certificate
    CertificateId,
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_id_display() {
        assert_eq!(CourseId::new(42).to_string(), "42");
    }

    #[test]
    fn quiz_id_from_str_trims_input() {
        let id: QuizId = " 123 ".parse().unwrap();
        assert_eq!(id, QuizId::new(123));
    }

    #[test]
    fn invalid_id_reports_kind() {
        let err = "not-a-number".parse::<LessonId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse LessonId from string");
    }

    #[test]
    fn debug_names_the_id_type() {
        assert_eq!(format!("{:?}", QuestionId::new(7)), "QuestionId(7)");
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&SubmissionId::new(9)).unwrap();
        assert_eq!(json, "9");
        let back: SubmissionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SubmissionId::new(9));
    }
}
