use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    GradedSubmission, OptionId, Percent, Question, QuestionId, QuestionType, Quiz, StudentAnswer,
    UserId,
};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GradingError {
    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(QuestionId),

    #[error("question {0} was answered more than once")]
    DuplicateAnswer(QuestionId),

    #[error("question {0} is linked to the quiz but was not loaded")]
    MissingQuestion(QuestionId),
}

//
// ─── INPUT ─────────────────────────────────────────────────────────────────────
//

/// One answer as submitted by the student, before grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerDraft {
    pub question_id: QuestionId,
    #[serde(default)]
    pub selected_option: Option<OptionId>,
    #[serde(default)]
    pub text_answer: Option<String>,
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Grade a single answer. `None` means the student skipped the question.
///
/// An option that does not belong to `question` is graded as incorrect.
#[must_use]
pub fn grade_answer(question: &Question, answer: Option<&AnswerDraft>) -> StudentAnswer {
    let selected_option = answer.and_then(|a| a.selected_option);
    let text_answer = answer.and_then(|a| a.text_answer.clone());

    let is_correct = match question.question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse => selected_option
            .and_then(|id| question.option(id))
            .is_some_and(|option| option.is_correct),
        QuestionType::ShortAnswer => match (&question.short_answer, &text_answer) {
            (Some(expected), Some(given)) => fold(expected) == fold(given),
            _ => false,
        },
    };

    StudentAnswer {
        question_id: question.id,
        selected_option,
        text_answer,
        is_correct,
        points_awarded: if is_correct { question.points } else { 0 },
    }
}

fn fold(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Grade a full attempt at `quiz`.
///
/// Produces one answer row per linked question, in link order. `questions` must
/// contain every question the quiz links; extra entries are ignored.
///
/// # Errors
///
/// Returns `GradingError` when an answer targets a question outside the quiz,
/// a question is answered twice, or a linked question is missing from `questions`.
pub fn grade_submission(
    quiz: &Quiz,
    questions: &[Question],
    student: UserId,
    answers: &[AnswerDraft],
    now: DateTime<Utc>,
) -> Result<GradedSubmission, GradingError> {
    let mut by_question: HashMap<QuestionId, &AnswerDraft> = HashMap::new();
    for answer in answers {
        if !quiz.links(answer.question_id) {
            return Err(GradingError::UnknownQuestion(answer.question_id));
        }
        if by_question.insert(answer.question_id, answer).is_some() {
            return Err(GradingError::DuplicateAnswer(answer.question_id));
        }
    }

    let bank: HashMap<QuestionId, &Question> = questions.iter().map(|q| (q.id, q)).collect();
    let mut graded = Vec::with_capacity(quiz.question_ids.len());
    let mut seen = HashSet::new();
    let mut score: u64 = 0;
    let mut max_score: u64 = 0;

    for id in &quiz.question_ids {
        if !seen.insert(*id) {
            continue;
        }
        let question = bank
            .get(id)
            .copied()
            .ok_or(GradingError::MissingQuestion(*id))?;
        let row = grade_answer(question, by_question.get(id).copied());
        score += u64::from(row.points_awarded);
        max_score += u64::from(question.points);
        graded.push(row);
    }

    Ok(GradedSubmission {
        quiz_id: quiz.id,
        student,
        score: saturate(score),
        max_score: saturate(max_score),
        percentage: Percent::ratio(score, max_score),
        answers: graded,
        submitted_at: now,
    })
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, CourseId, QuizDraft, QuizId};
    use crate::time::fixed_now;

    fn mcq(id: u64, text: &str, points: u32) -> Question {
        Question {
            id: QuestionId::new(id),
            text: text.into(),
            question_type: QuestionType::MultipleChoice,
            points,
            short_answer: None,
            options: vec![
                AnswerOption {
                    id: OptionId::new(id * 10),
                    text: "wrong".into(),
                    is_correct: false,
                },
                AnswerOption {
                    id: OptionId::new(id * 10 + 1),
                    text: "right".into(),
                    is_correct: true,
                },
            ],
        }
    }

    fn short(id: u64, canonical: Option<&str>) -> Question {
        Question {
            id: QuestionId::new(id),
            text: format!("short {id}"),
            question_type: QuestionType::ShortAnswer,
            points: 3,
            short_answer: canonical.map(str::to_owned),
            options: Vec::new(),
        }
    }

    fn quiz_with(questions: &[&Question]) -> Quiz {
        let mut quiz = QuizDraft {
            course_id: CourseId::new(1),
            lesson_id: None,
            title: "Quiz".into(),
            description: String::new(),
            time_limit_secs: None,
            prerequisite_lesson: None,
        }
        .validate(fixed_now())
        .unwrap()
        .assign_id(QuizId::new(1));
        quiz.relink_questions(questions.iter().map(|q| q.id));
        quiz
    }

    fn pick(question: u64, option: u64) -> AnswerDraft {
        AnswerDraft {
            question_id: QuestionId::new(question),
            selected_option: Some(OptionId::new(option)),
            text_answer: None,
        }
    }

    #[test]
    fn one_of_two_mcq_right_scores_half() {
        let q1 = mcq(1, "first", 2);
        let q2 = mcq(2, "second", 2);
        let quiz = quiz_with(&[&q1, &q2]);

        let graded = grade_submission(
            &quiz,
            &[q1, q2],
            UserId::new(7),
            &[pick(1, 11), pick(2, 20)],
            fixed_now(),
        )
        .unwrap();

        assert_eq!(graded.score, 2);
        assert_eq!(graded.max_score, 4);
        assert_eq!(graded.percentage, Percent::whole(50).unwrap());
        assert_eq!(
            graded.score,
            graded.answers.iter().map(|a| a.points_awarded).sum::<u32>()
        );
    }

    #[test]
    fn skipped_questions_get_an_empty_row() {
        let q1 = mcq(1, "first", 2);
        let q2 = mcq(2, "second", 2);
        let quiz = quiz_with(&[&q1, &q2]);

        let graded =
            grade_submission(&quiz, &[q1, q2], UserId::new(7), &[pick(2, 21)], fixed_now())
                .unwrap();

        assert_eq!(graded.answers.len(), 2);
        assert_eq!(graded.answers[0].question_id, QuestionId::new(1));
        assert_eq!(graded.answers[0].selected_option, None);
        assert!(!graded.answers[0].is_correct);
        assert_eq!(graded.score, 2);
    }

    #[test]
    fn foreign_option_is_incorrect_not_an_error() {
        let q1 = mcq(1, "first", 2);
        let q2 = mcq(2, "second", 2);
        let quiz = quiz_with(&[&q1, &q2]);

        // Option 21 is the correct option of question 2, not question 1.
        let graded =
            grade_submission(&quiz, &[q1, q2], UserId::new(7), &[pick(1, 21)], fixed_now())
                .unwrap();
        assert!(!graded.answers[0].is_correct);
        assert_eq!(graded.answers[0].selected_option, Some(OptionId::new(21)));
        assert_eq!(graded.score, 0);
    }

    #[test]
    fn short_answer_is_trimmed_and_case_folded() {
        let q = short(1, Some("Ownership"));
        let answer = AnswerDraft {
            question_id: q.id,
            selected_option: None,
            text_answer: Some("  ownership ".into()),
        };
        assert!(grade_answer(&q, Some(&answer)).is_correct);

        let near_miss = AnswerDraft {
            text_answer: Some("ownerships".into()),
            ..answer
        };
        let row = grade_answer(&q, Some(&near_miss));
        assert!(!row.is_correct);
        assert_eq!(row.points_awarded, 0);
    }

    #[test]
    fn short_answer_without_canonical_answer_never_matches() {
        let q = short(1, None);
        let answer = AnswerDraft {
            question_id: q.id,
            selected_option: None,
            text_answer: Some(String::new()),
        };
        assert!(!grade_answer(&q, Some(&answer)).is_correct);
    }

    #[test]
    fn rejects_unknown_and_duplicate_answers() {
        let q1 = mcq(1, "first", 2);
        let quiz = quiz_with(&[&q1]);
        let questions = [q1];

        let err = grade_submission(&quiz, &questions, UserId::new(7), &[pick(9, 90)], fixed_now())
            .unwrap_err();
        assert_eq!(err, GradingError::UnknownQuestion(QuestionId::new(9)));

        let err = grade_submission(
            &quiz,
            &questions,
            UserId::new(7),
            &[pick(1, 10), pick(1, 11)],
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, GradingError::DuplicateAnswer(QuestionId::new(1)));
    }

    #[test]
    fn missing_bank_entry_is_reported() {
        let q1 = mcq(1, "first", 2);
        let quiz = quiz_with(&[&q1]);
        let err = grade_submission(&quiz, &[], UserId::new(7), &[], fixed_now()).unwrap_err();
        assert_eq!(err, GradingError::MissingQuestion(QuestionId::new(1)));
    }

    #[test]
    fn empty_quiz_scores_zero_percent() {
        let quiz = quiz_with(&[]);
        let graded = grade_submission(&quiz, &[], UserId::new(7), &[], fixed_now()).unwrap();
        assert_eq!(graded.max_score, 0);
        assert_eq!(graded.percentage, Percent::ZERO);
    }
}
