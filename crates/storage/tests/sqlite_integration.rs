use lms_core::grading::{AnswerDraft, grade_submission};
use lms_core::model::{
    ConversionStatus, CourseId, LessonDraft, LessonId, LessonProgress, NewCertificate, OptionDraft,
    OptionId, Percent, QuestionDraft, QuestionKey, QuestionType, QuizDraft, QuizPrerequisite, UserId,
};
use lms_core::time::fixed_now;
use storage::repository::{
    CertificateRepository, CompletionPersistence, CourseRepository, EnrollmentRepository,
    LessonProgressRepository, LessonRepository, NewCourseRecord, QuestionRepository,
    QuizRepository, StorageError, SubmissionRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

async fn new_course(repo: &SqliteRepository, title: &str) -> CourseId {
    repo.insert_new_course(NewCourseRecord {
        title: title.into(),
        description: "systems programming".into(),
        instructor: UserId::new(100),
        created_at: fixed_now(),
    })
    .await
    .expect("course")
    .id()
}

async fn new_lesson(repo: &SqliteRepository, course: CourseId, order: u32) -> LessonId {
    let draft = LessonDraft {
        course_id: course,
        title: format!("Lesson {order}"),
        content: "body".into(),
        video_url: Some("https://videos.example.com/l.mp4".into()),
        order,
        prerequisite: None,
    };
    repo.insert_new_lesson(draft.validate(fixed_now()).unwrap())
        .await
        .expect("lesson")
        .id
}

fn mcq(text: &str) -> QuestionDraft {
    QuestionDraft {
        text: text.into(),
        question_type: QuestionType::MultipleChoice,
        points: 2,
        short_answer: None,
        options: vec![
            OptionDraft {
                id: None,
                text: "wrong".into(),
                is_correct: false,
            },
            OptionDraft {
                id: None,
                text: "right".into(),
                is_correct: true,
            },
        ],
    }
}

#[tokio::test]
async fn sqlite_progress_counts_lessons_and_submitted_quizzes() {
    let repo = connect("memdb_progress").await;
    let course = new_course(&repo, "Rust").await;
    let first = new_lesson(&repo, course, 1).await;
    new_lesson(&repo, course, 2).await;

    let mut quiz = repo
        .insert_new_quiz(
            QuizDraft {
                course_id: course,
                lesson_id: Some(first),
                title: "Checkpoint".into(),
                description: String::new(),
                time_limit_secs: Some(300),
                prerequisite_lesson: None,
            }
            .validate(fixed_now())
            .unwrap(),
        )
        .await
        .unwrap();
    let q1 = repo
        .insert_new_question(mcq("What is 2+2?").validate().unwrap())
        .await
        .unwrap();
    let q2 = repo
        .insert_new_question(mcq("What is 3+3?").validate().unwrap())
        .await
        .unwrap();
    quiz.relink_questions([q1.id, q2.id]);
    repo.update_quiz(&quiz).await.unwrap();

    let student = UserId::new(7);
    let (enrollment, created) = repo
        .get_or_create_enrollment(student, course, fixed_now())
        .await
        .unwrap();
    assert!(created);
    assert_eq!(enrollment.progress, Percent::ZERO);

    let recorded = repo
        .record_lesson_progress(LessonProgress::mark(student, first, true, fixed_now()), fixed_now())
        .await
        .unwrap();
    assert_eq!(recorded.enrollment.unwrap().progress.to_string(), "33.33");

    let stored_quiz = repo.get_quiz(quiz.id).await.unwrap();
    assert_eq!(stored_quiz.question_ids, vec![q1.id, q2.id]);
    let questions = repo.get_questions(&stored_quiz.question_ids).await.unwrap();
    let graded = grade_submission(
        &stored_quiz,
        &questions,
        student,
        &[AnswerDraft {
            question_id: q1.id,
            selected_option: Some(q1.options[1].id),
            text_answer: None,
        }],
        fixed_now(),
    )
    .unwrap();

    let recorded = repo.record_submission(graded.clone(), fixed_now()).await.unwrap();
    assert_eq!(recorded.submission.score, 2);
    assert_eq!(recorded.enrollment.unwrap().progress.to_string(), "66.67");

    let fetched = repo
        .find_submission(student, quiz.id)
        .await
        .unwrap()
        .expect("submission");
    assert_eq!(fetched.answers.len(), 2);
    assert_eq!(fetched.percentage, Percent::whole(50).unwrap());
    assert_eq!(
        repo.get_submission(fetched.id).await.unwrap().answers,
        fetched.answers
    );

    let err = repo.record_submission(graded, fixed_now()).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    let counts = repo.progress_counts(student, course).await.unwrap();
    assert_eq!(counts.completed_quizzes, 1);
}

#[tokio::test]
async fn sqlite_question_bank_is_keyed_by_text_and_syncs_options() {
    let repo = connect("memdb_bank").await;
    let created = repo
        .insert_new_question(mcq("  Which keyword moves a closure? ").validate().unwrap())
        .await
        .unwrap();
    assert_eq!(created.text, "Which keyword moves a closure?");

    let dup = repo
        .insert_new_question(mcq("Which keyword moves a closure?").validate().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(dup, StorageError::Conflict));

    let found = repo
        .find_question(&QuestionKey::new("Which keyword moves a closure?"))
        .await
        .unwrap()
        .expect("by key");
    assert_eq!(found.id, created.id);

    let mut patch = mcq("Which keyword moves a closure?");
    patch.options = vec![
        OptionDraft {
            id: Some(created.options[1].id),
            text: "move".into(),
            is_correct: true,
        },
        OptionDraft {
            id: None,
            text: "ref".into(),
            is_correct: false,
        },
    ];
    let updated = repo
        .update_question(created.id, patch.validate().unwrap())
        .await
        .unwrap();
    assert_eq!(updated.options.len(), 2);
    assert_eq!(updated.options[0].id, created.options[1].id);
    assert_eq!(updated.options[0].text, "move");
    assert!(updated.option(created.options[0].id).is_none());

    let (kept, added) = (updated.options[0].id, updated.options[1].id);
    let mut swap = mcq("Which keyword moves a closure?");
    swap.options = vec![
        OptionDraft {
            id: Some(kept),
            text: "ref".into(),
            is_correct: false,
        },
        OptionDraft {
            id: Some(added),
            text: "move".into(),
            is_correct: true,
        },
    ];
    let swapped = repo
        .update_question(created.id, swap.validate().unwrap())
        .await
        .unwrap();
    assert_eq!(swapped.options.len(), 2);
    assert_eq!(swapped.option(kept).unwrap().text, "ref");
    assert!(!swapped.option(kept).unwrap().is_correct);
    assert_eq!(swapped.option(added).unwrap().text, "move");
    assert!(swapped.option(added).unwrap().is_correct);

    let other = repo
        .insert_new_question(mcq("Another question").validate().unwrap())
        .await
        .unwrap();
    let clash = repo
        .update_question(other.id, mcq("Which keyword moves a closure?").validate().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(clash, StorageError::Conflict));
    assert_eq!(repo.list_questions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn sqlite_answer_naming_an_out_of_range_option_is_kept_as_wrong() {
    let repo = connect("memdb_wide_option").await;
    let course = new_course(&repo, "Ranges").await;
    new_lesson(&repo, course, 1).await;
    let mut quiz = repo
        .insert_new_quiz(
            QuizDraft {
                course_id: course,
                lesson_id: None,
                title: "Wide ids".into(),
                description: String::new(),
                time_limit_secs: None,
                prerequisite_lesson: None,
            }
            .validate(fixed_now())
            .unwrap(),
        )
        .await
        .unwrap();
    let question = repo
        .insert_new_question(mcq("Pick one").validate().unwrap())
        .await
        .unwrap();
    quiz.relink_questions([question.id]);
    repo.update_quiz(&quiz).await.unwrap();

    let student = UserId::new(9);
    repo.get_or_create_enrollment(student, course, fixed_now())
        .await
        .unwrap();
    let graded = grade_submission(
        &quiz,
        std::slice::from_ref(&question),
        student,
        &[AnswerDraft {
            question_id: question.id,
            selected_option: Some(OptionId::new(u64::MAX)),
            text_answer: None,
        }],
        fixed_now(),
    )
    .unwrap();

    let recorded = repo.record_submission(graded, fixed_now()).await.unwrap();
    assert_eq!(recorded.submission.score, 0);
    assert_eq!(recorded.enrollment.unwrap().progress.to_string(), "50.00");

    let stored = repo
        .find_submission(student, quiz.id)
        .await
        .unwrap()
        .expect("submission");
    assert!(!stored.answers[0].is_correct);
    assert_eq!(stored.answers[0].selected_option, None);
}

#[tokio::test]
async fn sqlite_deleting_content_cascades() {
    let repo = connect("memdb_cascade").await;
    let course = new_course(&repo, "Cascades").await;
    let lesson = new_lesson(&repo, course, 1).await;
    let quiz = repo
        .insert_new_quiz(
            QuizDraft {
                course_id: course,
                lesson_id: None,
                title: "Gate".into(),
                description: String::new(),
                time_limit_secs: None,
                prerequisite_lesson: Some(lesson),
            }
            .validate(fixed_now())
            .unwrap(),
        )
        .await
        .unwrap();

    let mut gated = repo.get_lesson(lesson).await.unwrap();
    gated.prerequisite = Some(QuizPrerequisite {
        quiz_id: quiz.id,
        min_score: Percent::whole(50).unwrap(),
    });
    repo.update_lesson(&gated).await.unwrap();
    assert_eq!(
        repo.get_lesson(lesson).await.unwrap().prerequisite,
        gated.prerequisite
    );

    let student = UserId::new(3);
    repo.get_or_create_enrollment(student, course, fixed_now())
        .await
        .unwrap();
    repo.record_lesson_progress(LessonProgress::mark(student, lesson, true, fixed_now()), fixed_now())
        .await
        .unwrap();

    repo.delete_quiz(quiz.id).await.unwrap();
    assert_eq!(repo.get_lesson(lesson).await.unwrap().prerequisite, None);

    repo.delete_lesson(lesson).await.unwrap();
    assert!(
        repo.get_lesson_progress(student, lesson)
            .await
            .unwrap()
            .is_none()
    );
    assert!(matches!(
        repo.get_lesson(lesson).await,
        Err(StorageError::NotFound)
    ));

    let enrollment = repo
        .recalculate_progress(student, course, fixed_now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enrollment.progress, Percent::ZERO);
    assert!(!enrollment.completed);
}

#[tokio::test]
async fn sqlite_lesson_files_and_certificates_persist() {
    let repo = connect("memdb_files").await;
    let course = new_course(&repo, "Files").await;
    let lesson_id = new_lesson(&repo, course, 1).await;

    let mut lesson = repo.get_lesson(lesson_id).await.unwrap();
    lesson.attach_file("slides.pptx", "store/slides.pptx").unwrap();
    repo.update_lesson(&lesson).await.unwrap();
    let converted = repo
        .set_conversion_status(
            lesson_id,
            &ConversionStatus::Ready {
                output_ref: "store/slides.pdf".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        converted.content_file.unwrap().status,
        ConversionStatus::Ready {
            output_ref: "store/slides.pdf".into()
        }
    );

    let student = UserId::new(5);
    repo.record_lesson_progress(LessonProgress::mark(student, lesson_id, true, fixed_now()), fixed_now())
        .await
        .unwrap();
    let (enrollment, created) = repo
        .get_or_create_enrollment(student, course, fixed_now())
        .await
        .unwrap();
    assert!(created);
    let enrollment = repo
        .recalculate_progress(student, course, fixed_now())
        .await
        .unwrap()
        .unwrap_or(enrollment);
    assert!(enrollment.completed);

    let cert = repo
        .insert_certificate(NewCertificate::issue(enrollment.id, fixed_now()))
        .await
        .unwrap();
    assert_eq!(
        repo.find_certificate(enrollment.id).await.unwrap(),
        Some(cert)
    );
    let again = repo
        .insert_certificate(NewCertificate::issue(enrollment.id, fixed_now()))
        .await
        .unwrap_err();
    assert!(matches!(again, StorageError::Conflict));

    let course_row = repo.get_course(course).await.unwrap();
    assert!(course_row.is_instructor(UserId::new(100)));
    assert_eq!(repo.list_courses().await.unwrap().len(), 1);
}
