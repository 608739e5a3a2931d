use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{OptionId, QuestionId, QuizId, SubmissionId, UserId};
use crate::model::percent::Percent;

/// One graded answer row. Correctness and points are fixed at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub question_id: QuestionId,
    pub selected_option: Option<OptionId>,
    pub text_answer: Option<String>,
    pub is_correct: bool,
    pub points_awarded: u32,
}

/// A graded attempt that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedSubmission {
    pub quiz_id: QuizId,
    pub student: UserId,
    pub score: u32,
    pub max_score: u32,
    pub percentage: Percent,
    pub answers: Vec<StudentAnswer>,
    pub submitted_at: DateTime<Utc>,
}

impl GradedSubmission {
    #[must_use]
    pub fn assign_id(self, id: SubmissionId) -> Submission {
        Submission {
            id,
            quiz_id: self.quiz_id,
            student: self.student,
            score: self.score,
            max_score: self.max_score,
            percentage: self.percentage,
            answers: self.answers,
            submitted_at: self.submitted_at,
        }
    }
}

/// A student's single, immutable attempt at a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub quiz_id: QuizId,
    pub student: UserId,
    pub score: u32,
    pub max_score: u32,
    pub percentage: Percent,
    pub answers: Vec<StudentAnswer>,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    #[must_use]
    pub fn answer_for(&self, question: QuestionId) -> Option<&StudentAnswer> {
        self.answers.iter().find(|a| a.question_id == question)
    }
}
