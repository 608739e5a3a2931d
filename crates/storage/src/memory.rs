use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::model::{
    AnswerOption, Certificate, CertificateId, ConversionStatus, Course, CourseId, Enrollment,
    EnrollmentId, GradedSubmission, Lesson, LessonId, LessonProgress, NewCertificate, OptionId,
    Question, QuestionId, QuestionKey, Quiz, QuizId, Submission, SubmissionId, UserId,
    ValidatedLesson, ValidatedQuestion, ValidatedQuiz,
};
use lms_core::progress::ProgressCounts;
use lms_core::recalc::{ProgressEvent, RecalcScope};

use crate::repository::{
    CertificateRepository, CompletionPersistence, CourseRepository, EnrollmentRepository,
    LessonProgressRecorded, LessonProgressRepository, LessonRepository, NewCourseRecord,
    QuestionRepository, QuizRepository, StorageError, SubmissionRecorded, SubmissionRepository,
};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[derive(Default)]
struct MemoryState {
    last_id: u64,
    courses: BTreeMap<CourseId, Course>,
    lessons: BTreeMap<LessonId, Lesson>,
    quizzes: BTreeMap<QuizId, Quiz>,
    questions: BTreeMap<QuestionId, Question>,
    question_keys: HashMap<QuestionKey, QuestionId>,
    enrollments: BTreeMap<EnrollmentId, Enrollment>,
    lesson_progress: HashMap<(UserId, LessonId), LessonProgress>,
    submissions: BTreeMap<SubmissionId, Submission>,
    certificates: BTreeMap<CertificateId, Certificate>,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn enrollment(&self, student: UserId, course: CourseId) -> Option<&Enrollment> {
        self.enrollments
            .values()
            .find(|e| e.student == student && e.course_id == course)
    }

    fn enrollment_mut(&mut self, student: UserId, course: CourseId) -> Option<&mut Enrollment> {
        self.enrollments
            .values_mut()
            .find(|e| e.student == student && e.course_id == course)
    }

    /// Another lesson of the course already sits at `order`.
    fn position_taken(&self, course: CourseId, order: u32, except: Option<LessonId>) -> bool {
        self.lessons
            .values()
            .any(|l| l.course_id == course && l.order == order && Some(l.id) != except)
    }

    fn counts(&self, student: UserId, course: CourseId) -> ProgressCounts {
        let total_lessons = self.lessons.values().filter(|l| l.course_id == course).count();
        let total_quizzes = self.quizzes.values().filter(|q| q.course_id == course).count();
        let completed_lessons = self
            .lesson_progress
            .values()
            .filter(|p| p.student == student && p.is_completed)
            .filter(|p| {
                self.lessons
                    .get(&p.lesson_id)
                    .is_some_and(|l| l.course_id == course)
            })
            .count();
        // One submission per (student, quiz), so counting rows counts distinct quizzes.
        let completed_quizzes = self
            .submissions
            .values()
            .filter(|s| s.student == student)
            .filter(|s| {
                self.quizzes
                    .get(&s.quiz_id)
                    .is_some_and(|q| q.course_id == course)
            })
            .count();

        ProgressCounts {
            total_lessons: total_lessons as u64,
            total_quizzes: total_quizzes as u64,
            completed_lessons: completed_lessons as u64,
            completed_quizzes: completed_quizzes as u64,
        }
    }

    fn recalculate(
        &mut self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Option<Enrollment> {
        let progress = self.counts(student, course).progress();
        let enrollment = self.enrollment_mut(student, course)?;
        enrollment.apply_progress(progress, now);
        Some(enrollment.clone())
    }

    fn recalculate_scope(&mut self, scope: RecalcScope, now: DateTime<Utc>) -> Option<Enrollment> {
        match scope {
            RecalcScope::Enrollment { student, course } => self.recalculate(student, course, now),
            RecalcScope::Course(_) | RecalcScope::Nothing => None,
        }
    }

    fn question_options(&mut self, drafts: &ValidatedQuestion) -> Vec<AnswerOption> {
        drafts
            .options
            .iter()
            .map(|draft| AnswerOption {
                id: OptionId::new(self.next_id()),
                text: draft.text.clone(),
                is_correct: draft.is_correct,
            })
            .collect()
    }
}

/// In-memory backend for tests and prototyping.
///
/// Every operation runs under one lock, so compound writes are atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

//
// ─── COURSES ───────────────────────────────────────────────────────────────────
//

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn insert_new_course(&self, course: NewCourseRecord) -> Result<Course, StorageError> {
        let mut guard = self.lock()?;
        if guard.courses.values().any(|c| c.title() == course.title.trim()) {
            return Err(StorageError::Conflict);
        }
        let id = CourseId::new(guard.next_id());
        let created = Course::new(
            id,
            course.title,
            course.description,
            course.instructor,
            course.created_at,
        )
        .map_err(ser)?;
        guard.courses.insert(id, created.clone());
        Ok(created)
    }

    async fn update_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.courses.contains_key(&course.id()) {
            return Err(StorageError::NotFound);
        }
        if guard
            .courses
            .values()
            .any(|c| c.id() != course.id() && c.title() == course.title())
        {
            return Err(StorageError::Conflict);
        }
        guard.courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let guard = self.lock()?;
        guard.courses.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.courses.values().cloned().collect())
    }
}

//
// ─── LESSONS ───────────────────────────────────────────────────────────────────
//

#[async_trait]
impl LessonRepository for InMemoryRepository {
    async fn insert_new_lesson(&self, lesson: ValidatedLesson) -> Result<Lesson, StorageError> {
        let mut guard = self.lock()?;
        if !guard.courses.contains_key(&lesson.course_id) {
            return Err(StorageError::NotFound);
        }
        if let Some(pre) = lesson.prerequisite {
            if !guard.quizzes.contains_key(&pre.quiz_id) {
                return Err(StorageError::NotFound);
            }
        }
        if guard.position_taken(lesson.course_id, lesson.order, None) {
            return Err(StorageError::Conflict);
        }
        let id = LessonId::new(guard.next_id());
        let created = lesson.assign_id(id);
        guard.lessons.insert(id, created.clone());
        Ok(created)
    }

    async fn update_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if let Some(pre) = lesson.prerequisite {
            if !guard.quizzes.contains_key(&pre.quiz_id) {
                return Err(StorageError::NotFound);
            }
        }
        if !guard.lessons.contains_key(&lesson.id) {
            return Err(StorageError::NotFound);
        }
        if guard.position_taken(lesson.course_id, lesson.order, Some(lesson.id)) {
            return Err(StorageError::Conflict);
        }
        guard.lessons.insert(lesson.id, lesson.clone());
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Lesson, StorageError> {
        let guard = self.lock()?;
        guard.lessons.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn delete_lesson(&self, id: LessonId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.lessons.remove(&id).ok_or(StorageError::NotFound)?;
        guard.lesson_progress.retain(|(_, lesson), _| *lesson != id);
        for quiz in guard.quizzes.values_mut() {
            if quiz.lesson_id == Some(id) {
                quiz.lesson_id = None;
            }
            if quiz.prerequisite_lesson == Some(id) {
                quiz.prerequisite_lesson = None;
            }
        }
        Ok(())
    }

    async fn list_lessons(&self, course: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let guard = self.lock()?;
        let mut lessons: Vec<Lesson> = guard
            .lessons
            .values()
            .filter(|l| l.course_id == course)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| (l.order, l.id));
        Ok(lessons)
    }

    async fn set_conversion_status(
        &self,
        id: LessonId,
        status: &ConversionStatus,
    ) -> Result<Lesson, StorageError> {
        let mut guard = self.lock()?;
        let lesson = guard.lessons.get_mut(&id).ok_or(StorageError::NotFound)?;
        let file = lesson.content_file.as_mut().ok_or(StorageError::NotFound)?;
        file.status = status.clone();
        Ok(lesson.clone())
    }
}

//
// ─── QUIZZES ───────────────────────────────────────────────────────────────────
//

fn check_quiz_refs(state: &MemoryState, quiz: &Quiz) -> Result<(), StorageError> {
    let lesson_refs = [quiz.lesson_id, quiz.prerequisite_lesson];
    if lesson_refs
        .iter()
        .flatten()
        .any(|id| !state.lessons.contains_key(id))
    {
        return Err(StorageError::NotFound);
    }
    if quiz
        .question_ids
        .iter()
        .any(|id| !state.questions.contains_key(id))
    {
        return Err(StorageError::NotFound);
    }
    Ok(())
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn insert_new_quiz(&self, quiz: ValidatedQuiz) -> Result<Quiz, StorageError> {
        let mut guard = self.lock()?;
        if !guard.courses.contains_key(&quiz.course_id) {
            return Err(StorageError::NotFound);
        }
        let id = QuizId::new(guard.next_id());
        let created = quiz.assign_id(id);
        check_quiz_refs(&guard, &created)?;
        guard.quizzes.insert(id, created.clone());
        Ok(created)
    }

    async fn update_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.quizzes.contains_key(&quiz.id) {
            return Err(StorageError::NotFound);
        }
        check_quiz_refs(&guard, quiz)?;
        guard.quizzes.insert(quiz.id, quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: QuizId) -> Result<Quiz, StorageError> {
        let guard = self.lock()?;
        guard.quizzes.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn delete_quiz(&self, id: QuizId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.quizzes.remove(&id).ok_or(StorageError::NotFound)?;
        guard.submissions.retain(|_, s| s.quiz_id != id);
        for lesson in guard.lessons.values_mut() {
            if lesson.prerequisite.is_some_and(|p| p.quiz_id == id) {
                lesson.prerequisite = None;
            }
        }
        Ok(())
    }

    async fn list_quizzes(&self, course: CourseId) -> Result<Vec<Quiz>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .quizzes
            .values()
            .filter(|q| q.course_id == course)
            .cloned()
            .collect())
    }
}

//
// ─── QUESTION BANK ─────────────────────────────────────────────────────────────
//

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn insert_new_question(
        &self,
        question: ValidatedQuestion,
    ) -> Result<Question, StorageError> {
        let mut guard = self.lock()?;
        if guard.question_keys.contains_key(&question.key) {
            return Err(StorageError::Conflict);
        }
        let id = QuestionId::new(guard.next_id());
        let options = guard.question_options(&question);
        let created = Question {
            id,
            text: question.text().to_owned(),
            question_type: question.question_type,
            points: question.points,
            short_answer: question.short_answer,
            options,
        };
        guard.question_keys.insert(question.key, id);
        guard.questions.insert(id, created.clone());
        Ok(created)
    }

    async fn update_question(
        &self,
        id: QuestionId,
        question: ValidatedQuestion,
    ) -> Result<Question, StorageError> {
        let mut guard = self.lock()?;
        let existing = guard.questions.get(&id).ok_or(StorageError::NotFound)?;
        if guard
            .question_keys
            .get(&question.key)
            .is_some_and(|owner| *owner != id)
        {
            return Err(StorageError::Conflict);
        }

        let old_key = existing.key();
        let plan = existing.plan_option_sync(&question.options);
        let mut options = plan.update;
        for draft in plan.create {
            options.push(AnswerOption {
                id: OptionId::new(guard.next_id()),
                text: draft.text,
                is_correct: draft.is_correct,
            });
        }
        options.sort_by_key(|o| o.id);

        let updated = Question {
            id,
            text: question.text().to_owned(),
            question_type: question.question_type,
            points: question.points,
            short_answer: question.short_answer,
            options,
        };
        guard.question_keys.remove(&old_key);
        guard.question_keys.insert(question.key, id);
        guard.questions.insert(id, updated.clone());
        Ok(updated)
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let guard = self.lock()?;
        guard.questions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        ids.iter()
            .map(|id| guard.questions.get(id).cloned().ok_or(StorageError::NotFound))
            .collect()
    }

    async fn find_question(&self, key: &QuestionKey) -> Result<Option<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .question_keys
            .get(key)
            .and_then(|id| guard.questions.get(id))
            .cloned())
    }

    async fn list_questions(&self) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.questions.values().cloned().collect())
    }
}

//
// ─── ENROLLMENTS & PROGRESS ────────────────────────────────────────────────────
//

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn get_or_create_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<(Enrollment, bool), StorageError> {
        let mut guard = self.lock()?;
        if !guard.courses.contains_key(&course) {
            return Err(StorageError::NotFound);
        }
        if let Some(existing) = guard.enrollment(student, course) {
            return Ok((existing.clone(), false));
        }
        let id = EnrollmentId::new(guard.next_id());
        let created = Enrollment::new(id, student, course, now);
        guard.enrollments.insert(id, created.clone());
        Ok((created, true))
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, StorageError> {
        let guard = self.lock()?;
        guard.enrollments.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn find_enrollment(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.enrollment(student, course).cloned())
    }

    async fn list_course_enrollments(
        &self,
        course: CourseId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .enrollments
            .values()
            .filter(|e| e.course_id == course)
            .cloned()
            .collect())
    }

    async fn list_student_enrollments(
        &self,
        student: UserId,
    ) -> Result<Vec<Enrollment>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .enrollments
            .values()
            .filter(|e| e.student == student)
            .cloned()
            .collect())
    }

    async fn progress_counts(
        &self,
        student: UserId,
        course: CourseId,
    ) -> Result<ProgressCounts, StorageError> {
        let guard = self.lock()?;
        Ok(guard.counts(student, course))
    }

    async fn recalculate_progress(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, StorageError> {
        let mut guard = self.lock()?;
        Ok(guard.recalculate(student, course, now))
    }
}

#[async_trait]
impl LessonProgressRepository for InMemoryRepository {
    async fn get_lesson_progress(
        &self,
        student: UserId,
        lesson: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.lesson_progress.get(&(student, lesson)).cloned())
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryRepository {
    async fn get_submission(&self, id: SubmissionId) -> Result<Submission, StorageError> {
        let guard = self.lock()?;
        guard.submissions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn find_submission(
        &self,
        student: UserId,
        quiz: QuizId,
    ) -> Result<Option<Submission>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .submissions
            .values()
            .find(|s| s.student == student && s.quiz_id == quiz)
            .cloned())
    }
}

#[async_trait]
impl CertificateRepository for InMemoryRepository {
    async fn insert_certificate(
        &self,
        certificate: NewCertificate,
    ) -> Result<Certificate, StorageError> {
        let mut guard = self.lock()?;
        if !guard.enrollments.contains_key(&certificate.enrollment_id) {
            return Err(StorageError::NotFound);
        }
        if guard
            .certificates
            .values()
            .any(|c| c.enrollment_id == certificate.enrollment_id)
        {
            return Err(StorageError::Conflict);
        }
        let id = CertificateId::new(guard.next_id());
        let created = certificate.assign_id(id);
        guard.certificates.insert(id, created.clone());
        Ok(created)
    }

    async fn find_certificate(
        &self,
        enrollment: EnrollmentId,
    ) -> Result<Option<Certificate>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .certificates
            .values()
            .find(|c| c.enrollment_id == enrollment)
            .cloned())
    }
}

#[async_trait]
impl CompletionPersistence for InMemoryRepository {
    async fn record_lesson_progress(
        &self,
        progress: LessonProgress,
        now: DateTime<Utc>,
    ) -> Result<LessonProgressRecorded, StorageError> {
        let mut guard = self.lock()?;
        let course = guard
            .lessons
            .get(&progress.lesson_id)
            .map(|l| l.course_id)
            .ok_or(StorageError::NotFound)?;

        let key = (progress.student, progress.lesson_id);
        let previous = guard.lesson_progress.get(&key).cloned();
        let saved = progress.merged_with(previous.as_ref());
        let transition = saved.transition_from(previous.as_ref());
        guard.lesson_progress.insert(key, saved.clone());

        let event = ProgressEvent::LessonProgressSaved {
            student: saved.student,
            course,
            transition,
        };
        let enrollment = guard.recalculate_scope(event.scope(), now);
        Ok(LessonProgressRecorded {
            progress: saved,
            transition,
            enrollment,
        })
    }

    async fn record_submission(
        &self,
        submission: GradedSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionRecorded, StorageError> {
        let mut guard = self.lock()?;
        let course = guard
            .quizzes
            .get(&submission.quiz_id)
            .map(|q| q.course_id)
            .ok_or(StorageError::NotFound)?;
        if guard
            .submissions
            .values()
            .any(|s| s.student == submission.student && s.quiz_id == submission.quiz_id)
        {
            return Err(StorageError::Conflict);
        }

        let id = SubmissionId::new(guard.next_id());
        let stored = submission.assign_id(id);
        guard.submissions.insert(id, stored.clone());

        let event = ProgressEvent::SubmissionCreated {
            student: stored.student,
            course,
        };
        let enrollment = guard.recalculate_scope(event.scope(), now);
        Ok(SubmissionRecorded {
            submission: stored,
            enrollment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::{CompletionTransition, LessonDraft, Percent};
    use lms_core::time::fixed_now;

    async fn course_with_lessons(repo: &InMemoryRepository, n: u32) -> (CourseId, Vec<LessonId>) {
        let course = repo
            .insert_new_course(NewCourseRecord {
                title: "Rust".into(),
                description: String::new(),
                instructor: UserId::new(100),
                created_at: fixed_now(),
            })
            .await
            .unwrap();
        let mut lessons = Vec::new();
        for order in 0..n {
            let lesson = LessonDraft {
                course_id: course.id(),
                title: format!("Lesson {order}"),
                content: String::new(),
                video_url: None,
                order,
                prerequisite: None,
            }
            .validate(fixed_now())
            .unwrap();
            lessons.push(repo.insert_new_lesson(lesson).await.unwrap().id);
        }
        (course.id(), lessons)
    }

    #[tokio::test]
    async fn duplicate_course_title_conflicts() {
        let repo = InMemoryRepository::new();
        course_with_lessons(&repo, 0).await;
        let err = repo
            .insert_new_course(NewCourseRecord {
                title: " Rust ".into(),
                description: String::new(),
                instructor: UserId::new(1),
                created_at: fixed_now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn lesson_progress_recalculates_and_reopens() {
        let repo = InMemoryRepository::new();
        let (course, lessons) = course_with_lessons(&repo, 2).await;
        let student = UserId::new(7);
        repo.get_or_create_enrollment(student, course, fixed_now())
            .await
            .unwrap();

        let done = LessonProgress::mark(student, lessons[0], true, fixed_now());
        let recorded = repo.record_lesson_progress(done, fixed_now()).await.unwrap();
        assert_eq!(recorded.transition, CompletionTransition::Completed);
        assert_eq!(
            recorded.enrollment.unwrap().progress,
            Percent::whole(50).unwrap()
        );

        let undone = LessonProgress::mark(student, lessons[0], false, fixed_now());
        let recorded = repo
            .record_lesson_progress(undone, fixed_now())
            .await
            .unwrap();
        assert_eq!(recorded.transition, CompletionTransition::Reopened);
        assert_eq!(recorded.enrollment.unwrap().progress, Percent::ZERO);
    }

    #[tokio::test]
    async fn deleting_a_lesson_drops_its_progress_rows() {
        let repo = InMemoryRepository::new();
        let (_, lessons) = course_with_lessons(&repo, 1).await;
        let student = UserId::new(7);
        repo.record_lesson_progress(
            LessonProgress::mark(student, lessons[0], true, fixed_now()),
            fixed_now(),
        )
        .await
        .unwrap();

        repo.delete_lesson(lessons[0]).await.unwrap();
        assert!(
            repo.get_lesson_progress(student, lessons[0])
                .await
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            repo.delete_lesson(lessons[0]).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn recalculating_without_enrollment_is_a_no_op() {
        let repo = InMemoryRepository::new();
        let (course, _) = course_with_lessons(&repo, 1).await;
        let result = repo
            .recalculate_progress(UserId::new(1), course, fixed_now())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
