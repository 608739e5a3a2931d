use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question points must be > 0")]
    ZeroPoints,

    #[error("short-answer questions need a canonical answer")]
    MissingShortAnswer,

    #[error("short-answer questions cannot have options")]
    UnexpectedOptions,

    #[error("option text cannot be empty")]
    EmptyOptionText,

    #[error("duplicate option text: {0}")]
    DuplicateOption(String),

    #[error("multiple-choice questions need at least two options")]
    TooFewOptions,

    #[error("true/false questions need exactly two options")]
    TrueFalseOptionCount,

    #[error("{0} questions need exactly one correct option")]
    CorrectOptionCount(QuestionType),

    #[error("multiple-choice questions need at least one correct option")]
    NoCorrectOption,

    #[error("unknown question type: {0}")]
    UnknownType(String),
}

//
// ─── QUESTION TYPE ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    /// Storage code for the type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "mcq",
            QuestionType::TrueFalse => "tf",
            QuestionType::ShortAnswer => "short",
        }
    }

    /// # Errors
    ///
    /// Returns `QuestionError::UnknownType` for codes other than `mcq`, `tf`, `short`.
    pub fn parse(code: &str) -> Result<Self, QuestionError> {
        match code {
            "mcq" => Ok(QuestionType::MultipleChoice),
            "tf" => Ok(QuestionType::TrueFalse),
            "short" => Ok(QuestionType::ShortAnswer),
            other => Err(QuestionError::UnknownType(other.to_owned())),
        }
    }

    #[must_use]
    pub fn is_choice(self) -> bool {
        !matches!(self, QuestionType::ShortAnswer)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuestionType::MultipleChoice => "multiple-choice",
            QuestionType::TrueFalse => "true/false",
            QuestionType::ShortAnswer => "short-answer",
        };
        f.write_str(label)
    }
}

//
// ─── QUESTION BANK KEY ─────────────────────────────────────────────────────────
//

/// Content address of a question in the global bank.
///
/// Two questions with the same key are the same question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuestionKey(String);

impl QuestionKey {
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self(text.trim().to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//
// ─── OPTIONS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

/// Option input. `id` refers to an existing option of the same question when updating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDraft {
    #[serde(default)]
    pub id: Option<OptionId>,
    pub text: String,
    pub is_correct: bool,
}

/// How a question's stored options change to match an incoming option list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSyncPlan {
    pub update: Vec<AnswerOption>,
    pub create: Vec<OptionDraft>,
    pub delete: Vec<OptionId>,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub text: String,
    pub question_type: QuestionType,
    pub points: u32,
    #[serde(default)]
    pub short_answer: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionDraft>,
}

impl QuestionDraft {
    /// # Errors
    ///
    /// Returns `QuestionError` when text, points, options or the canonical answer
    /// do not fit the question type.
    pub fn validate(self) -> Result<ValidatedQuestion, QuestionError> {
        let key = QuestionKey::new(&self.text);
        if key.as_str().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if self.points == 0 {
            return Err(QuestionError::ZeroPoints);
        }

        let options = normalize_options(self.options)?;
        let short_answer = match self.question_type {
            QuestionType::ShortAnswer => {
                if !options.is_empty() {
                    return Err(QuestionError::UnexpectedOptions);
                }
                let answer = self
                    .short_answer
                    .map(|a| a.trim().to_owned())
                    .filter(|a| !a.is_empty())
                    .ok_or(QuestionError::MissingShortAnswer)?;
                Some(answer)
            }
            QuestionType::MultipleChoice => {
                if options.len() < 2 {
                    return Err(QuestionError::TooFewOptions);
                }
                if !options.iter().any(|o| o.is_correct) {
                    return Err(QuestionError::NoCorrectOption);
                }
                None
            }
            QuestionType::TrueFalse => {
                if options.len() != 2 {
                    return Err(QuestionError::TrueFalseOptionCount);
                }
                if options.iter().filter(|o| o.is_correct).count() != 1 {
                    return Err(QuestionError::CorrectOptionCount(QuestionType::TrueFalse));
                }
                None
            }
        };

        Ok(ValidatedQuestion {
            key,
            question_type: self.question_type,
            points: self.points,
            short_answer,
            options,
        })
    }
}

fn normalize_options(options: Vec<OptionDraft>) -> Result<Vec<OptionDraft>, QuestionError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(options.len());
    for option in options {
        let text = option.text.trim().to_owned();
        if text.is_empty() {
            return Err(QuestionError::EmptyOptionText);
        }
        if !seen.insert(text.clone()) {
            return Err(QuestionError::DuplicateOption(text));
        }
        out.push(OptionDraft { text, ..option });
    }
    Ok(out)
}

/// A question that passed validation but has no id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuestion {
    pub key: QuestionKey,
    pub question_type: QuestionType,
    pub points: u32,
    pub short_answer: Option<String>,
    pub options: Vec<OptionDraft>,
}

impl ValidatedQuestion {
    #[must_use]
    pub fn text(&self) -> &str {
        self.key.as_str()
    }
}

/// A question of the shared bank, reusable across quizzes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub question_type: QuestionType,
    pub points: u32,
    pub short_answer: Option<String>,
    pub options: Vec<AnswerOption>,
}

impl Question {
    #[must_use]
    pub fn key(&self) -> QuestionKey {
        QuestionKey::new(&self.text)
    }

    #[must_use]
    pub fn option(&self, id: OptionId) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.id == id)
    }

    /// Whether `update` would change anything about this question.
    #[must_use]
    pub fn differs_from(&self, update: &ValidatedQuestion) -> bool {
        if self.text != update.text()
            || self.question_type != update.question_type
            || self.points != update.points
            || self.short_answer != update.short_answer
            || self.options.len() != update.options.len()
        {
            return true;
        }
        !self.options.iter().zip(&update.options).all(|(have, want)| {
            want.id == Some(have.id) && have.text == want.text && have.is_correct == want.is_correct
        })
    }

    /// Match incoming options against the stored ones by id.
    ///
    /// Ids that do not belong to this question are created afresh; stored options
    /// missing from `incoming` are deleted.
    #[must_use]
    pub fn plan_option_sync(&self, incoming: &[OptionDraft]) -> OptionSyncPlan {
        let mut plan = OptionSyncPlan::default();
        let mut kept = HashSet::new();

        for draft in incoming {
            match draft.id.and_then(|id| self.option(id)) {
                Some(existing) if kept.insert(existing.id) => plan.update.push(AnswerOption {
                    id: existing.id,
                    text: draft.text.clone(),
                    is_correct: draft.is_correct,
                }),
                _ => plan.create.push(OptionDraft {
                    id: None,
                    ..draft.clone()
                }),
            }
        }

        plan.delete = self
            .options
            .iter()
            .map(|o| o.id)
            .filter(|id| !kept.contains(id))
            .collect();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: Option<u64>, text: &str, is_correct: bool) -> OptionDraft {
        OptionDraft {
            id: id.map(OptionId::new),
            text: text.into(),
            is_correct,
        }
    }

    fn mcq(options: Vec<OptionDraft>) -> QuestionDraft {
        QuestionDraft {
            text: "  What is 2+2?  ".into(),
            question_type: QuestionType::MultipleChoice,
            points: 2,
            short_answer: Some("ignored".into()),
            options,
        }
    }

    fn stored() -> Question {
        Question {
            id: QuestionId::new(1),
            text: "What is 2+2?".into(),
            question_type: QuestionType::MultipleChoice,
            points: 2,
            short_answer: None,
            options: vec![
                AnswerOption {
                    id: OptionId::new(10),
                    text: "3".into(),
                    is_correct: false,
                },
                AnswerOption {
                    id: OptionId::new(11),
                    text: "4".into(),
                    is_correct: true,
                },
            ],
        }
    }

    #[test]
    fn mcq_validation_trims_and_drops_short_answer() {
        let v = mcq(vec![option(None, " 3 ", false), option(None, "4", true)])
            .validate()
            .unwrap();
        assert_eq!(v.text(), "What is 2+2?");
        assert_eq!(v.options[0].text, "3");
        assert_eq!(v.short_answer, None);
    }

    #[test]
    fn mcq_needs_a_correct_option_and_unique_texts() {
        let err = mcq(vec![option(None, "3", false), option(None, "4", false)])
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::NoCorrectOption);

        let err = mcq(vec![option(None, "4", true), option(None, " 4", false)])
            .validate()
            .unwrap_err();
        assert_eq!(err, QuestionError::DuplicateOption("4".into()));

        let err = mcq(vec![option(None, "4", true)]).validate().unwrap_err();
        assert_eq!(err, QuestionError::TooFewOptions);
    }

    #[test]
    fn true_false_needs_exactly_one_correct_of_two() {
        let draft = QuestionDraft {
            text: "Rust has a garbage collector".into(),
            question_type: QuestionType::TrueFalse,
            points: 1,
            short_answer: None,
            options: vec![option(None, "True", true), option(None, "False", true)],
        };
        assert_eq!(
            draft.validate().unwrap_err(),
            QuestionError::CorrectOptionCount(QuestionType::TrueFalse)
        );
    }

    #[test]
    fn short_answer_needs_canonical_answer_and_no_options() {
        let mut draft = QuestionDraft {
            text: "Name the borrow checker's unit of analysis".into(),
            question_type: QuestionType::ShortAnswer,
            points: 3,
            short_answer: Some("   ".into()),
            options: Vec::new(),
        };
        assert_eq!(
            draft.clone().validate().unwrap_err(),
            QuestionError::MissingShortAnswer
        );

        draft.short_answer = Some(" Lifetimes ".into());
        assert_eq!(
            draft.clone().validate().unwrap().short_answer.as_deref(),
            Some("Lifetimes")
        );

        draft.options.push(option(None, "x", true));
        assert_eq!(
            draft.validate().unwrap_err(),
            QuestionError::UnexpectedOptions
        );
    }

    #[test]
    fn zero_points_and_empty_text_are_rejected() {
        let mut draft = mcq(vec![option(None, "3", false), option(None, "4", true)]);
        draft.points = 0;
        assert_eq!(draft.validate().unwrap_err(), QuestionError::ZeroPoints);

        let mut draft = mcq(vec![option(None, "3", false), option(None, "4", true)]);
        draft.text = "   ".into();
        assert_eq!(draft.validate().unwrap_err(), QuestionError::EmptyText);
    }

    #[test]
    fn type_codes_round_trip() {
        for t in [
            QuestionType::MultipleChoice,
            QuestionType::TrueFalse,
            QuestionType::ShortAnswer,
        ] {
            assert_eq!(QuestionType::parse(t.as_str()).unwrap(), t);
        }
        assert!(QuestionType::parse("essay").is_err());
    }

    #[test]
    fn option_sync_matches_by_id_and_deletes_the_rest() {
        let plan = stored().plan_option_sync(&[
            option(Some(11), "four", true),
            option(Some(99), "5", false),
            option(None, "22", false),
        ]);

        assert_eq!(
            plan.update,
            vec![AnswerOption {
                id: OptionId::new(11),
                text: "four".into(),
                is_correct: true
            }]
        );
        assert_eq!(plan.create.len(), 2);
        assert!(plan.create.iter().all(|o| o.id.is_none()));
        assert_eq!(plan.delete, vec![OptionId::new(10)]);
    }

    #[test]
    fn option_sync_with_same_id_twice_creates_the_second() {
        let plan = stored().plan_option_sync(&[
            option(Some(10), "3", false),
            option(Some(10), "three", false),
        ]);
        assert_eq!(plan.update.len(), 1);
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.delete, vec![OptionId::new(11)]);
    }

    #[test]
    fn differs_from_detects_changes() {
        let q = stored();
        let same = mcq(vec![option(Some(10), "3", false), option(Some(11), "4", true)])
            .validate()
            .unwrap();
        assert!(!q.differs_from(&same));

        let mut changed = same.clone();
        changed.points = 5;
        assert!(q.differs_from(&changed));
    }
}
