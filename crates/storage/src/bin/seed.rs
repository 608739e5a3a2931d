use std::fmt;

use chrono::{DateTime, Utc};
use lms_core::model::{
    CourseId, LessonDraft, LessonProgress, OptionDraft, Question, QuestionDraft, QuestionKey,
    QuestionType, QuizDraft, UserId,
};
use storage::repository::{NewCourseRecord, Storage};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_title: String,
    instructor: UserId,
    student: UserId,
    lessons: u32,
    completed: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUserId { flag: &'static str, raw: String },
    InvalidLessons { raw: String },
    InvalidCompleted { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUserId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidLessons { raw } => write!(f, "invalid --lessons value: {raw}"),
            ArgsError::InvalidCompleted { raw } => write!(f, "invalid --completed value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_user(value: String, flag: &'static str) -> Result<UserId, ArgsError> {
    value
        .parse::<u64>()
        .map(UserId::new)
        .map_err(|_| ArgsError::InvalidUserId { flag, raw: value })
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("LMS_DB_URL").unwrap_or_else(|_| "sqlite:lms.sqlite3".into());
        let mut course_title =
            std::env::var("LMS_COURSE_TITLE").unwrap_or_else(|_| "Intro to Rust".into());
        let mut instructor = UserId::new(env_u64("LMS_INSTRUCTOR_ID", 1));
        let mut student = UserId::new(env_u64("LMS_STUDENT_ID", 2));
        let mut lessons = std::env::var("LMS_LESSONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let mut completed = std::env::var("LMS_COMPLETED")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(1);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-title" => {
                    course_title = require_value(&mut args, "--course-title")?;
                }
                "--instructor" => {
                    let value = require_value(&mut args, "--instructor")?;
                    instructor = parse_user(value, "--instructor")?;
                }
                "--student" => {
                    let value = require_value(&mut args, "--student")?;
                    student = parse_user(value, "--student")?;
                }
                "--lessons" => {
                    let value = require_value(&mut args, "--lessons")?;
                    lessons = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLessons { raw: value.clone() })?;
                }
                "--completed" => {
                    let value = require_value(&mut args, "--completed")?;
                    completed = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidCompleted { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_title,
            instructor,
            student,
            lessons,
            completed,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:lms.sqlite3)");
    eprintln!("  --course-title <title>    Course to create or reuse (default: Intro to Rust)");
    eprintln!("  --instructor <id>         Instructor user id (default: 1)");
    eprintln!("  --student <id>            Student user id to enroll (default: 2)");
    eprintln!("  --lessons <n>             Lessons to create on a new course (default: 3)");
    eprintln!("  --completed <n>           Lessons the student has completed (default: 1)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  LMS_DB_URL, LMS_COURSE_TITLE, LMS_INSTRUCTOR_ID, LMS_STUDENT_ID, LMS_LESSONS, LMS_COMPLETED"
    );
}

fn sample_questions() -> Vec<QuestionDraft> {
    let choice = |text: &str, is_correct: bool| OptionDraft {
        id: None,
        text: text.into(),
        is_correct,
    };
    vec![
        QuestionDraft {
            text: "Which keyword declares an immutable binding?".into(),
            question_type: QuestionType::MultipleChoice,
            points: 1,
            short_answer: None,
            options: vec![
                choice("let", true),
                choice("mut", false),
                choice("static", false),
            ],
        },
        QuestionDraft {
            text: "A value can have two mutable borrows at once.".into(),
            question_type: QuestionType::TrueFalse,
            points: 1,
            short_answer: None,
            options: vec![choice("True", false), choice("False", true)],
        },
        QuestionDraft {
            text: "Which trait makes a type printable with {}?".into(),
            question_type: QuestionType::ShortAnswer,
            points: 2,
            short_answer: Some("Display".into()),
            options: Vec::new(),
        },
    ]
}

async fn bank_question(
    storage: &Storage,
    draft: QuestionDraft,
) -> Result<Question, Box<dyn std::error::Error>> {
    let validated = draft.validate()?;
    if let Some(existing) = storage
        .questions
        .find_question(&QuestionKey::new(validated.text()))
        .await?
    {
        return Ok(existing);
    }
    Ok(storage.questions.insert_new_question(validated).await?)
}

async fn seed_course(
    storage: &Storage,
    args: &Args,
    now: DateTime<Utc>,
) -> Result<CourseId, Box<dyn std::error::Error>> {
    let existing = storage
        .courses
        .list_courses()
        .await?
        .into_iter()
        .find(|course| course.title() == args.course_title.trim());
    if let Some(course) = existing {
        return Ok(course.id());
    }

    let course = storage
        .courses
        .insert_new_course(NewCourseRecord {
            title: args.course_title.clone(),
            description: "Ownership, borrowing and the standard traits.".into(),
            instructor: args.instructor,
            created_at: now,
        })
        .await?;

    let mut first_lesson = None;
    for i in 0..args.lessons {
        let draft = LessonDraft {
            course_id: course.id(),
            title: format!("Lesson {}", i + 1),
            content: format!("Notes for lesson {}.", i + 1),
            video_url: None,
            order: i + 1,
            prerequisite: None,
        };
        let lesson = storage.lessons.insert_new_lesson(draft.validate(now)?).await?;
        first_lesson.get_or_insert(lesson.id);
    }

    let mut quiz = storage
        .quizzes
        .insert_new_quiz(
            QuizDraft {
                course_id: course.id(),
                lesson_id: first_lesson,
                title: "Checkpoint".into(),
                description: "Basics of bindings and borrowing.".into(),
                time_limit_secs: Some(600),
                prerequisite_lesson: first_lesson,
            }
            .validate(now)?,
        )
        .await?;
    let mut question_ids = Vec::new();
    for draft in sample_questions() {
        question_ids.push(bank_question(storage, draft).await?.id);
    }
    quiz.relink_questions(question_ids);
    storage.quizzes.update_quiz(&quiz).await?;

    Ok(course.id())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let course_id = seed_course(&storage, &args, now).await?;
    let (enrollment, created) = storage
        .enrollments
        .get_or_create_enrollment(args.student, course_id, now)
        .await?;

    let lessons = storage.lessons.list_lessons(course_id).await?;
    let take = usize::try_from(args.completed).unwrap_or(usize::MAX);
    for lesson in lessons.iter().take(take) {
        let progress = LessonProgress::mark(args.student, lesson.id, true, now);
        storage
            .completions
            .record_lesson_progress(progress, now)
            .await?;
    }
    let enrollment = storage
        .enrollments
        .recalculate_progress(args.student, course_id, now)
        .await?
        .unwrap_or(enrollment);

    println!(
        "Seeded course {} ({} lessons); student {} {} at {}% into {}",
        course_id.value(),
        lessons.len(),
        args.student.value(),
        if created { "enrolled" } else { "already enrolled" },
        enrollment.progress,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
