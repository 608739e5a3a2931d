use std::collections::HashMap;
use std::sync::Arc;

use lms_core::model::{Question, QuestionId, QuestionKey, ValidatedQuestion};
use storage::repository::{QuestionRepository, StorageError};
use tracing::{debug, info};

use crate::api::QuestionInput;
use crate::error::{OrNotFound, ServiceError};

/// The global, text-keyed pool of questions that quizzes link into.
#[derive(Clone)]
pub struct QuestionBank {
    questions: Arc<dyn QuestionRepository>,
}

/// Outcome of resolving one quiz entry against the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Found by id, left as is.
    Reused(QuestionId),
    /// Found by id and patched to the submitted content.
    Patched(QuestionId),
    /// Found by exact text.
    Linked(QuestionId),
    Created(QuestionId),
}

impl Resolution {
    #[must_use]
    pub fn id(self) -> QuestionId {
        match self {
            Resolution::Reused(id)
            | Resolution::Patched(id)
            | Resolution::Linked(id)
            | Resolution::Created(id) => id,
        }
    }
}

/// Validated quiz entries with the question id each one names, if any.
pub type ValidatedEntries = Vec<(Option<QuestionId>, ValidatedQuestion)>;

#[derive(Debug)]
enum Step {
    Reuse(QuestionId),
    Patch(QuestionId, ValidatedQuestion),
    Link(QuestionId),
    /// Same text as an earlier entry of the batch.
    SameAs(usize),
    Create(ValidatedQuestion),
}

impl Step {
    fn known_id(&self) -> Option<QuestionId> {
        match self {
            Step::Reuse(id) | Step::Patch(id, _) | Step::Link(id) => Some(*id),
            Step::SameAs(_) | Step::Create(_) => None,
        }
    }
}

/// Quiz entries checked against the bank, ready for [`QuestionBank::apply`].
#[derive(Debug)]
pub struct SyncPlan {
    steps: Vec<Step>,
}

impl SyncPlan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Entries that will write to the bank when applied.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Patch(..) | Step::Create(_)))
            .count()
    }
}

fn key_taken(key: &QuestionKey) -> ServiceError {
    ServiceError::Validation(format!(
        "question text {:?} belongs to another question",
        key.as_str()
    ))
}

impl QuestionBank {
    #[must_use]
    pub fn new(questions: Arc<dyn QuestionRepository>) -> Self {
        Self { questions }
    }

    /// Validate every entry before anything is written.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` naming the first invalid entry.
    pub fn validate(inputs: Vec<QuestionInput>) -> Result<ValidatedEntries, ServiceError> {
        inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                input
                    .draft
                    .validate()
                    .map(|validated| (input.id, validated))
                    .map_err(|err| ServiceError::Validation(format!("question {}: {err}", index + 1)))
            })
            .collect()
    }

    /// Check every entry against the bank without writing anything.
    ///
    /// Entries resolve by id (patched when the content changed), else by exact
    /// text, else they are created. Entries sharing a text resolve to one question.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` when a patch would take another
    /// question's text, and `Storage` for repository failures.
    pub async fn plan(&self, entries: ValidatedEntries) -> Result<SyncPlan, ServiceError> {
        // Key -> index of the first step that owns it once applied.
        let mut claimed: HashMap<QuestionKey, usize> = HashMap::new();
        // Old keys given up by patches earlier in the batch.
        let mut vacated: HashMap<QuestionKey, QuestionId> = HashMap::new();
        let mut steps: Vec<Step> = Vec::with_capacity(entries.len());

        for (index, (id, question)) in entries.into_iter().enumerate() {
            let existing = match id {
                Some(id) => match self.questions.get_question(id).await {
                    Ok(found) => Some(found),
                    Err(StorageError::NotFound) => {
                        debug!(question = %id, "unknown question id, matching by text");
                        None
                    }
                    Err(err) => return Err(err.into()),
                },
                None => None,
            };

            let key = question.key.clone();
            let step = match existing {
                Some(existing) if existing.differs_from(&question) => {
                    self.check_key_free(existing.id, &key, &claimed, &vacated, &steps)
                        .await?;
                    let old_key = existing.key();
                    if old_key != key {
                        vacated.insert(old_key, existing.id);
                    }
                    Step::Patch(existing.id, question)
                }
                Some(existing) => Step::Reuse(existing.id),
                None => match claimed.get(&key) {
                    Some(&owner) => Step::SameAs(owner),
                    None => match self.questions.find_question(&key).await? {
                        Some(found) if vacated.get(&key) != Some(&found.id) => {
                            Step::Link(found.id)
                        }
                        _ => Step::Create(question),
                    },
                },
            };
            claimed.entry(key).or_insert(index);
            steps.push(step);
        }
        Ok(SyncPlan { steps })
    }

    /// A patch may only take a key that is free, its own, or vacated earlier in the batch.
    async fn check_key_free(
        &self,
        id: QuestionId,
        key: &QuestionKey,
        claimed: &HashMap<QuestionKey, usize>,
        vacated: &HashMap<QuestionKey, QuestionId>,
        steps: &[Step],
    ) -> Result<(), ServiceError> {
        if let Some(&owner) = claimed.get(key) {
            if steps.get(owner).and_then(Step::known_id) != Some(id) {
                return Err(key_taken(key));
            }
        }
        match self.questions.find_question(key).await? {
            Some(found) if found.id != id && vacated.get(key) != Some(&found.id) => {
                Err(key_taken(key))
            }
            _ => Ok(()),
        }
    }

    /// Write a checked plan in entry order.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` for persistence failures and `Validation`
    /// if another writer took a patched text since the plan was made.
    pub async fn apply(&self, plan: SyncPlan) -> Result<Vec<Resolution>, ServiceError> {
        let mut done: Vec<Resolution> = Vec::with_capacity(plan.steps.len());
        for step in plan.steps {
            let resolution = match step {
                Step::Reuse(id) => Resolution::Reused(id),
                Step::Link(id) => Resolution::Linked(id),
                Step::SameAs(index) => {
                    let first = done.get(index).copied().ok_or_else(|| {
                        ServiceError::Validation(format!("question {} unresolved", index + 1))
                    })?;
                    Resolution::Linked(first.id())
                }
                Step::Patch(id, question) => self.patch(id, question).await?,
                Step::Create(question) => self.create(question).await?,
            };
            done.push(resolution);
        }
        Ok(done)
    }

    /// Plan and apply a single entry.
    ///
    /// # Errors
    ///
    /// See [`QuestionBank::plan`] and [`QuestionBank::apply`].
    pub async fn resolve(
        &self,
        id: Option<QuestionId>,
        question: ValidatedQuestion,
    ) -> Result<Resolution, ServiceError> {
        let plan = self.plan(vec![(id, question)]).await?;
        self.apply(plan)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Validation("question 1 unresolved".into()))
    }

    async fn patch(
        &self,
        id: QuestionId,
        question: ValidatedQuestion,
    ) -> Result<Resolution, ServiceError> {
        let key = question.key.clone();
        match self.questions.update_question(id, question).await {
            Ok(_) => {
                info!(question = %id, "question patched");
                Ok(Resolution::Patched(id))
            }
            Err(StorageError::Conflict) => match self.questions.find_question(&key).await? {
                Some(owner) if owner.id != id => Err(key_taken(&key)),
                _ => Err(StorageError::Conflict.into()),
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn create(&self, question: ValidatedQuestion) -> Result<Resolution, ServiceError> {
        let key = question.key.clone();
        match self.questions.insert_new_question(question).await {
            Ok(created) => {
                info!(question = %created.id, "question created");
                Ok(Resolution::Created(created.id))
            }
            // Lost a race with another writer of the same text.
            Err(StorageError::Conflict) => self
                .questions
                .find_question(&key)
                .await?
                .map(|q| Resolution::Linked(q.id))
                .ok_or_else(|| key_taken(&key)),
            Err(err) => Err(err.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the question does not exist.
    pub async fn get_question(&self, id: QuestionId) -> Result<Question, ServiceError> {
        self.questions
            .get_question(id)
            .await
            .or_not_found("question", id.value())
    }

    /// Exact lookup by question text (surrounding whitespace ignored).
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if repository access fails.
    pub async fn find_question(&self, text: &str) -> Result<Option<Question>, ServiceError> {
        Ok(self.questions.find_question(&QuestionKey::new(text)).await?)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if repository access fails.
    pub async fn list_questions(&self) -> Result<Vec<Question>, ServiceError> {
        Ok(self.questions.list_questions().await?)
    }

    pub(crate) async fn load(&self, ids: &[QuestionId]) -> Result<Vec<Question>, ServiceError> {
        Ok(self.questions.get_questions(ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::{OptionDraft, QuestionDraft, QuestionType};
    use storage::InMemoryRepository;

    fn tf(text: &str, answer: bool) -> QuestionDraft {
        QuestionDraft {
            text: text.into(),
            question_type: QuestionType::TrueFalse,
            points: 1,
            short_answer: None,
            options: vec![
                OptionDraft {
                    id: None,
                    text: "True".into(),
                    is_correct: answer,
                },
                OptionDraft {
                    id: None,
                    text: "False".into(),
                    is_correct: !answer,
                },
            ],
        }
    }

    fn input(id: Option<QuestionId>, draft: QuestionDraft) -> (Option<QuestionId>, ValidatedQuestion) {
        QuestionBank::validate(vec![QuestionInput { id, draft }])
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn resolves_by_id_then_text_then_creates() {
        let bank = QuestionBank::new(Arc::new(InMemoryRepository::new()));

        let (id, q) = input(None, tf("Rust has a GC.", false));
        let created = bank.resolve(id, q).await.unwrap();
        assert!(matches!(created, Resolution::Created(_)));

        let (id, q) = input(None, tf("  Rust has a GC. ", false));
        assert_eq!(bank.resolve(id, q).await.unwrap(), Resolution::Linked(created.id()));

        let (id, q) = input(Some(QuestionId::new(999)), tf("Rust has a GC.", false));
        assert_eq!(bank.resolve(id, q).await.unwrap(), Resolution::Linked(created.id()));

        let existing = bank.get_question(created.id()).await.unwrap();
        let mut same = tf("Rust has a GC.", false);
        for (draft, option) in same.options.iter_mut().zip(&existing.options) {
            draft.id = Some(option.id);
        }
        let (id, q) = input(Some(created.id()), same);
        assert_eq!(bank.resolve(id, q).await.unwrap(), Resolution::Reused(created.id()));

        let (id, q) = input(Some(created.id()), tf("Rust has no GC.", true));
        assert_eq!(bank.resolve(id, q).await.unwrap(), Resolution::Patched(created.id()));
        assert_eq!(bank.list_questions().await.unwrap().len(), 1);
        assert!(bank.find_question("Rust has no GC.").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn patching_onto_another_questions_text_is_rejected() {
        let bank = QuestionBank::new(Arc::new(InMemoryRepository::new()));
        let (id, q) = input(None, tf("First", true));
        bank.resolve(id, q).await.unwrap();
        let (id, q) = input(None, tf("Second", true));
        let second = bank.resolve(id, q).await.unwrap().id();

        let (id, q) = input(Some(second), tf("First", false));
        let err = bank.resolve(id, q).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref msg) if msg.contains("First")));
    }

    #[tokio::test]
    async fn a_rejected_entry_leaves_the_whole_batch_unwritten() {
        let bank = QuestionBank::new(Arc::new(InMemoryRepository::new()));
        let (id, q) = input(None, tf("First", true));
        bank.resolve(id, q).await.unwrap();
        let (id, q) = input(None, tf("Second", true));
        let second = bank.resolve(id, q).await.unwrap().id();

        let err = bank
            .plan(vec![
                input(None, tf("Brand new", true)),
                input(Some(second), tf("First", false)),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(bank.list_questions().await.unwrap().len(), 2);
        assert!(bank.find_question("Brand new").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_text_in_one_batch_creates_one_question() {
        let bank = QuestionBank::new(Arc::new(InMemoryRepository::new()));
        let plan = bank
            .plan(vec![
                input(None, tf("Twice", true)),
                input(None, tf("  Twice ", true)),
            ])
            .await
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.writes(), 1);

        let resolved = bank.apply(plan).await.unwrap();
        assert!(matches!(resolved[0], Resolution::Created(_)));
        assert_eq!(resolved[1], Resolution::Linked(resolved[0].id()));
        assert_eq!(bank.list_questions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn a_text_vacated_earlier_in_the_batch_can_be_reused() {
        let bank = QuestionBank::new(Arc::new(InMemoryRepository::new()));
        let (id, q) = input(None, tf("Old wording", true));
        let first = bank.resolve(id, q).await.unwrap().id();

        let plan = bank
            .plan(vec![
                input(Some(first), tf("New wording", true)),
                input(None, tf("Old wording", true)),
            ])
            .await
            .unwrap();
        let resolved = bank.apply(plan).await.unwrap();
        assert_eq!(resolved[0], Resolution::Patched(first));
        assert!(matches!(resolved[1], Resolution::Created(id) if id != first));
        assert_eq!(bank.list_questions().await.unwrap().len(), 2);
    }

    #[test]
    fn invalid_entries_are_reported_by_position() {
        let mut bad = tf("Broken", true);
        bad.points = 0;
        let err = QuestionBank::validate(vec![
            QuestionInput {
                id: None,
                draft: tf("Fine", true),
            },
            QuestionInput { id: None, draft: bad },
        ])
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref msg) if msg.starts_with("question 2")));
    }
}
