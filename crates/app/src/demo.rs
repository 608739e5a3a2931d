use lms_core::grading::AnswerDraft;
use lms_core::model::{
    CourseId, LessonDraft, OptionDraft, Percent, Principal, QuestionDraft, QuestionType,
    QuizDraft, QuizPrerequisite, UserId,
};
use serde::Serialize;
use services::{
    AccessResponse, AppServices, LessonProgressRequest, QuestionInput, QuizInput, ServiceError,
    SubmissionRequest, SubmissionResponse,
};

const INSTRUCTOR: UserId = UserId::new(1);
const STUDENT: UserId = UserId::new(2);

/// What a walk through one small course produced.
#[derive(Debug, Serialize)]
pub struct DemoSummary {
    pub course: CourseId,
    pub after_lesson: Option<Percent>,
    pub submission: SubmissionResponse,
    pub gated_lesson: AccessResponse,
    pub final_progress: Percent,
    pub certificate: Option<String>,
}

fn question(text: &str, right: &str, wrong: &str) -> QuestionInput {
    let option = |text: &str, is_correct| OptionDraft {
        id: None,
        text: text.into(),
        is_correct,
    };
    QuestionInput {
        id: None,
        draft: QuestionDraft {
            text: text.into(),
            question_type: QuestionType::MultipleChoice,
            points: 1,
            short_answer: None,
            options: vec![option(right, true), option(wrong, false)],
        },
    }
}

/// Build a two-lesson course with a gating quiz, then complete it as a student.
///
/// # Errors
///
/// Returns `ServiceError` from any service call.
pub async fn run_demo(app: &AppServices) -> Result<DemoSummary, ServiceError> {
    let instructor = Principal::instructor(INSTRUCTOR);
    let student = Principal::student(STUDENT);

    let course = app
        .courses()
        .create_course(&instructor, "Demo course", "Two lessons and a checkpoint")
        .await?
        .id();
    let intro = app
        .lessons()
        .create_lesson(
            &instructor,
            LessonDraft {
                course_id: course,
                title: "Getting started".into(),
                content: "Welcome.".into(),
                video_url: None,
                order: 1,
                prerequisite: None,
            },
        )
        .await?
        .value;
    let quiz = app
        .quizzes()
        .create_quiz(
            &instructor,
            QuizInput {
                quiz: QuizDraft {
                    course_id: course,
                    lesson_id: Some(intro.id),
                    title: "Checkpoint".into(),
                    description: String::new(),
                    time_limit_secs: None,
                    prerequisite_lesson: Some(intro.id),
                },
                questions: Some(vec![
                    question("What is 2+2?", "4", "5"),
                    question("Which keyword binds a variable?", "let", "var"),
                ]),
            },
        )
        .await?
        .value;
    let advanced = app
        .lessons()
        .create_lesson(
            &instructor,
            LessonDraft {
                course_id: course,
                title: "Going further".into(),
                content: "Unlocked by the checkpoint.".into(),
                video_url: None,
                order: 2,
                prerequisite: Some(QuizPrerequisite {
                    quiz_id: quiz.id,
                    min_score: Percent::whole(50)?,
                }),
            },
        )
        .await?
        .value;

    app.enrollments()
        .enroll(&student, STUDENT, &[course])
        .await?;
    let after_lesson = app
        .lesson_progress()
        .save(
            &student,
            LessonProgressRequest {
                lesson_id: intro.id,
                is_completed: true,
            },
        )
        .await?
        .progress;

    let answers = app
        .quizzes()
        .quiz_questions(quiz.id)
        .await?
        .iter()
        .map(|q| AnswerDraft {
            question_id: q.id,
            selected_option: q.options.iter().find(|o| o.is_correct).map(|o| o.id),
            text_answer: None,
        })
        .collect();
    let submission = app
        .submissions()
        .submit(
            &student,
            SubmissionRequest {
                quiz_id: quiz.id,
                answers,
            },
        )
        .await?;
    let gated_lesson = app.access().check_lesson(&student, advanced.id).await?;

    let report = app
        .lesson_progress()
        .save(
            &student,
            LessonProgressRequest {
                lesson_id: advanced.id,
                is_completed: true,
            },
        )
        .await?;
    let enrollment = app
        .enrollments()
        .progress_report(&student, STUDENT, course)
        .await?
        .enrollment;
    let certificate = if enrollment.completed {
        let issued = app
            .certificates()
            .issue_certificate(&student, enrollment.id)
            .await?;
        Some(issued.serial.to_string())
    } else {
        None
    };

    Ok(DemoSummary {
        course,
        after_lesson,
        submission,
        gated_lesson,
        final_progress: report.progress.unwrap_or(enrollment.progress),
        certificate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::time::fixed_clock;

    #[tokio::test]
    async fn demo_completes_the_course() {
        let app = AppServices::in_memory(fixed_clock());
        let summary = run_demo(&app).await.unwrap();

        assert_eq!(summary.after_lesson.unwrap().to_string(), "33.33");
        assert_eq!(summary.submission.score, 2);
        assert!(summary.gated_lesson.allowed);
        assert_eq!(summary.final_progress, Percent::HUNDRED);
        assert!(summary.certificate.is_some());
    }
}
