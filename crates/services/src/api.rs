//! Request and response shapes exchanged with the (external) HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lms_core::gate::{AccessDecision, DenialReason};
use lms_core::grading::AnswerDraft;
use lms_core::model::{
    CompletionTransition, Course, Lesson, LessonId, Percent, QuestionDraft, QuestionId, Quiz,
    QuizDraft, QuizId, Submission, SubmissionId,
};

use crate::recalc_trigger::FanOutReport;

/// A content edit together with the recalculation it caused.
#[derive(Debug, Clone, Serialize)]
pub struct ContentEdit<T> {
    pub value: T,
    pub fan_out: FanOutReport,
}

//
// ─── QUIZZES ───────────────────────────────────────────────────────────────────
//

/// One entry of a quiz's question list.
///
/// `id` is tried first, then the question text, else a new question is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionInput {
    #[serde(default)]
    pub id: Option<QuestionId>,
    #[serde(flatten)]
    pub draft: QuestionDraft,
}

/// Quiz metadata plus an optional question list.
///
/// `questions: None` leaves the linked set alone; `Some` replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizInput {
    #[serde(flatten)]
    pub quiz: QuizDraft,
    #[serde(default)]
    pub questions: Option<Vec<QuestionInput>>,
}

//
// ─── SUBMISSIONS ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub quiz_id: QuizId,
    #[serde(default)]
    pub answers: Vec<AnswerDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub points_awarded: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub submission_id: SubmissionId,
    pub quiz_id: QuizId,
    pub score: u32,
    pub max_score: u32,
    pub percentage: Percent,
    pub answers: Vec<AnswerResult>,
    /// Course progress after the submission, when the student is enrolled.
    pub progress: Option<Percent>,
}

impl SubmissionResponse {
    #[must_use]
    pub fn new(submission: &Submission, progress: Option<Percent>) -> Self {
        Self {
            submission_id: submission.id,
            quiz_id: submission.quiz_id,
            score: submission.score,
            max_score: submission.max_score,
            percentage: submission.percentage,
            answers: submission
                .answers
                .iter()
                .map(|a| AnswerResult {
                    question_id: a.question_id,
                    is_correct: a.is_correct,
                    points_awarded: a.points_awarded,
                })
                .collect(),
            progress,
        }
    }
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgressRequest {
    pub lesson_id: LessonId,
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonProgressResponse {
    pub lesson_id: LessonId,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub transition: CompletionTransition,
    pub progress: Option<Percent>,
}

//
// ─── ACCESS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
}

impl From<AccessDecision> for AccessResponse {
    fn from(decision: AccessDecision) -> Self {
        match decision {
            AccessDecision::Allowed => Self {
                allowed: true,
                reason: None,
                denial: None,
            },
            AccessDecision::Denied(reason) => Self {
                allowed: false,
                reason: Some(reason.to_string()),
                denial: Some(reason),
            },
        }
    }
}

//
// ─── CURRICULUM ────────────────────────────────────────────────────────────────
//

/// A course with its lessons in display order and its quizzes.
#[derive(Debug, Clone, Serialize)]
pub struct Curriculum {
    pub course: Course,
    pub lessons: Vec<Lesson>,
    pub quizzes: Vec<Quiz>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::Percent;

    #[test]
    fn denied_access_serializes_reason_and_structure() {
        let decision = AccessDecision::Denied(DenialReason::ScoreBelowThreshold {
            quiz_id: QuizId::new(4),
            required: Percent::whole(50).unwrap(),
            achieved: Percent::whole(40).unwrap(),
        });
        let json = serde_json::to_value(AccessResponse::from(decision)).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["denial"]["kind"], "score_below_threshold");
        assert_eq!(json["denial"]["quiz_id"], 4);
        let reason = json["reason"].as_str().unwrap();
        assert!(reason.contains("quiz 4") && reason.contains("50.00%"));

        let allowed = serde_json::to_value(AccessResponse::from(AccessDecision::Allowed)).unwrap();
        assert_eq!(allowed, serde_json::json!({ "allowed": true }));
    }

    #[test]
    fn quiz_input_reads_flat_payload() {
        let input: QuizInput = serde_json::from_value(serde_json::json!({
            "course_id": 1,
            "title": "Checkpoint",
            "questions": [
                { "text": "What is 2+2?", "question_type": "multiple_choice", "points": 2,
                  "options": [
                      { "text": "4", "is_correct": true },
                      { "text": "5", "is_correct": false }
                  ] },
                { "id": 9, "text": "Name the trait", "question_type": "short_answer",
                  "points": 1, "short_answer": "Display" }
            ]
        }))
        .unwrap();
        assert_eq!(input.quiz.title, "Checkpoint");
        assert_eq!(input.quiz.lesson_id, None);
        let questions = input.questions.unwrap();
        assert_eq!(questions[0].id, None);
        assert_eq!(questions[0].draft.options.len(), 2);
        assert_eq!(questions[1].id, Some(QuestionId::new(9)));
    }

    #[test]
    fn submission_request_defaults_optional_answer_fields() {
        let req: SubmissionRequest = serde_json::from_value(serde_json::json!({
            "quiz_id": 3,
            "answers": [{ "question_id": 1, "selected_option": 7 }]
        }))
        .unwrap();
        assert_eq!(req.answers[0].text_answer, None);
        assert_eq!(req.answers[0].selected_option.map(|o| o.value()), Some(7));
    }
}
