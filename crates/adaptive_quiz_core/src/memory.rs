//! crates/adaptive_quiz_core/src/memory.rs
//!
//! An in-process implementation of every storage port. Used by the test suites of
//! both crates and handy for local experiments without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::domain::{
    CefrLevel, DailyAssignment, LearningPreferences, PriorityScore, Question, QuestionStatus,
    QuestionType, TopicPerformance, User, UserQuestionMetadata, UserResponse,
};
use crate::ports::{
    Completion, DailyAssignmentRepository, LearnerRepository, PortError, PortResult,
    PriorityRepository, QuestionRepository, UserSettings,
};

#[derive(Default)]
struct Tables {
    questions: HashMap<Uuid, Question>,
    /// Insertion order, so listings are stable.
    question_order: Vec<Uuid>,
    users: HashMap<Uuid, User>,
    preferences: HashMap<Uuid, LearningPreferences>,
    metadata: HashMap<(Uuid, Uuid), UserQuestionMetadata>,
    responses: Vec<UserResponse>,
    scores: HashMap<(Uuid, Uuid), PriorityScore>,
    daily_sets: BTreeSet<(Uuid, NaiveDate)>,
    assignments: Vec<DailyAssignment>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestionRepository for InMemoryStore {
    async fn save_question(&self, question: &Question) -> PortResult<()> {
        let mut t = self.tables.lock();
        if t.questions.insert(question.id, question.clone()).is_none() {
            t.question_order.push(question.id);
        }
        Ok(())
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        self.tables
            .lock()
            .questions
            .get(&question_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Question {} not found", question_id)))
    }

    async fn list_active_questions(
        &self,
        language: &str,
        level: CefrLevel,
        question_type: Option<QuestionType>,
    ) -> PortResult<Vec<Question>> {
        let t = self.tables.lock();
        Ok(t.question_order
            .iter()
            .filter_map(|id| t.questions.get(id))
            .filter(|q| q.is_active() && q.language == language && q.level == level)
            .filter(|q| question_type.map_or(true, |qt| qt == q.question_type))
            .cloned()
            .collect())
    }

    async fn set_question_status(
        &self,
        question_id: Uuid,
        status: QuestionStatus,
    ) -> PortResult<()> {
        let mut t = self.tables.lock();
        let question = t
            .questions
            .get_mut(&question_id)
            .ok_or_else(|| PortError::NotFound(format!("Question {} not found", question_id)))?;
        question.status = status;
        Ok(())
    }

    async fn increment_usage(&self, question_ids: &[Uuid]) -> PortResult<()> {
        let mut t = self.tables.lock();
        for id in question_ids {
            if let Some(q) = t.questions.get_mut(id) {
                q.usage_count += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LearnerRepository for InMemoryStore {
    async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<User> {
        let mut t = self.tables.lock();
        Ok(t.users
            .entry(user_id)
            .or_insert_with(|| User {
                user_id,
                preferred_language: None,
                current_level: None,
                timezone: None,
            })
            .clone())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.tables
            .lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn update_user_settings(
        &self,
        user_id: Uuid,
        settings: &UserSettings,
    ) -> PortResult<User> {
        let mut t = self.tables.lock();
        let user = t
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        if let Some(language) = &settings.preferred_language {
            user.preferred_language = Some(language.clone());
        }
        if let Some(level) = settings.current_level {
            user.current_level = Some(level);
        }
        if let Some(tz) = &settings.timezone {
            user.timezone = Some(tz.clone());
        }
        Ok(user.clone())
    }

    async fn list_user_ids(&self) -> PortResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.tables.lock().users.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_preferences(&self, user_id: Uuid) -> PortResult<Option<LearningPreferences>> {
        Ok(self.tables.lock().preferences.get(&user_id).cloned())
    }

    async fn create_preferences_if_absent(
        &self,
        prefs: &LearningPreferences,
    ) -> PortResult<LearningPreferences> {
        let mut t = self.tables.lock();
        Ok(t.preferences.entry(prefs.user_id).or_insert_with(|| prefs.clone()).clone())
    }

    async fn update_preferences(
        &self,
        prefs: &LearningPreferences,
    ) -> PortResult<LearningPreferences> {
        let mut t = self.tables.lock();
        match t.preferences.get_mut(&prefs.user_id) {
            Some(stored) => {
                *stored = prefs.clone();
                Ok(stored.clone())
            }
            None => Err(PortError::NotFound(format!(
                "Preferences for user {} not found",
                prefs.user_id
            ))),
        }
    }

    async fn list_metadata(&self, user_id: Uuid) -> PortResult<Vec<UserQuestionMetadata>> {
        Ok(self
            .tables
            .lock()
            .metadata
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_metadata(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<UserQuestionMetadata>> {
        Ok(self.tables.lock().metadata.get(&(user_id, question_id)).cloned())
    }

    async fn upsert_metadata(&self, metadata: &UserQuestionMetadata) -> PortResult<()> {
        self.tables
            .lock()
            .metadata
            .insert((metadata.user_id, metadata.question_id), metadata.clone());
        Ok(())
    }

    async fn record_response(&self, response: &UserResponse) -> PortResult<()> {
        self.tables.lock().responses.push(response.clone());
        Ok(())
    }

    async fn list_responses(&self, user_id: Uuid) -> PortResult<Vec<UserResponse>> {
        let mut responses: Vec<UserResponse> = self
            .tables
            .lock()
            .responses
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        responses.sort_by_key(|r| r.created_at);
        Ok(responses)
    }

    async fn list_topic_performance(&self, user_id: Uuid) -> PortResult<Vec<TopicPerformance>> {
        let t = self.tables.lock();
        let mut by_topic: HashMap<String, TopicPerformance> = HashMap::new();
        for r in t.responses.iter().filter(|r| r.user_id == user_id) {
            let Some(topic) = t.questions.get(&r.question_id).and_then(|q| q.topic.clone()) else {
                continue;
            };
            let entry = by_topic.entry(topic.clone()).or_insert(TopicPerformance {
                topic,
                attempts: 0,
                correct: 0,
            });
            entry.attempts += 1;
            if r.is_correct {
                entry.correct += 1;
            }
        }
        Ok(by_topic.into_values().collect())
    }
}

#[async_trait]
impl PriorityRepository for InMemoryStore {
    async fn list_priority_scores(&self, user_id: Uuid) -> PortResult<Vec<PriorityScore>> {
        Ok(self
            .tables
            .lock()
            .scores
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_priority_scores(&self, scores: &[PriorityScore]) -> PortResult<()> {
        let mut t = self.tables.lock();
        for s in scores {
            t.scores.insert((s.user_id, s.question_id), s.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl DailyAssignmentRepository for InMemoryStore {
    async fn list_daily_assignments(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Vec<DailyAssignment>> {
        Ok(self
            .tables
            .lock()
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id && a.assignment_date == date)
            .cloned()
            .collect())
    }

    async fn create_daily_set(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        question_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let mut t = self.tables.lock();
        if !t.daily_sets.insert((user_id, date)) {
            return Ok(false);
        }
        for question_id in question_ids {
            t.assignments.push(DailyAssignment {
                id: Uuid::new_v4(),
                user_id,
                question_id: *question_id,
                assignment_date: date,
                is_completed: false,
                completed_at: None,
                user_answer_index: None,
                created_at,
            });
        }
        Ok(true)
    }

    async fn replace_daily_set(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        question_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut t = self.tables.lock();
        t.daily_sets.insert((user_id, date));
        t.assignments
            .retain(|a| !(a.user_id == user_id && a.assignment_date == date && !a.is_completed));
        for question_id in question_ids {
            t.assignments.push(DailyAssignment {
                id: Uuid::new_v4(),
                user_id,
                question_id: *question_id,
                assignment_date: date,
                is_completed: false,
                completed_at: None,
                user_answer_index: None,
                created_at,
            });
        }
        Ok(())
    }

    async fn complete_assignment(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        date: NaiveDate,
        answer_index: usize,
        completed_at: DateTime<Utc>,
    ) -> PortResult<Completion> {
        let mut t = self.tables.lock();
        let assignment = t
            .assignments
            .iter_mut()
            .find(|a| a.user_id == user_id && a.question_id == question_id && a.assignment_date == date)
            .ok_or_else(|| {
                PortError::NotFound(format!(
                    "Assignment for question {} on {} not found",
                    question_id, date
                ))
            })?;
        if assignment.is_completed {
            return Ok(Completion::AlreadyCompleted(assignment.clone()));
        }
        assignment.is_completed = true;
        assignment.completed_at = Some(completed_at);
        assignment.user_answer_index = Some(answer_index);
        Ok(Completion::Completed(assignment.clone()))
    }

    async fn list_assignment_dates(&self, user_id: Uuid) -> PortResult<Vec<NaiveDate>> {
        let t = self.tables.lock();
        let dates: BTreeSet<NaiveDate> = t
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.assignment_date)
            .collect();
        Ok(dates.into_iter().rev().collect())
    }

    async fn list_assignments_for_question(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        since: NaiveDate,
    ) -> PortResult<Vec<DailyAssignment>> {
        Ok(self
            .tables
            .lock()
            .assignments
            .iter()
            .filter(|a| {
                a.user_id == user_id && a.question_id == question_id && a.assignment_date >= since
            })
            .cloned()
            .collect())
    }
}
