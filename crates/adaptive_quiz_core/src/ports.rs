//! crates/adaptive_quiz_core/src/ports.rs
//!
//! Defines the storage contracts (traits) the quiz engine depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{
    CefrLevel, DailyAssignment, LearningPreferences, PriorityScore, Question, QuestionStatus,
    QuestionType, TopicPerformance, User, UserQuestionMetadata, UserResponse,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Result of trying to complete a daily assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// This call performed the incomplete -> completed transition.
    Completed(DailyAssignment),
    /// The row had already been completed; the stored record is returned untouched.
    AlreadyCompleted(DailyAssignment),
}

/// Profile fields a user may change through the settings endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSettings {
    pub preferred_language: Option<String>,
    pub current_level: Option<CefrLevel>,
    pub timezone: Option<String>,
}

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn save_question(&self, question: &Question) -> PortResult<()>;

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question>;

    /// Active questions for a language/level, optionally restricted to one type.
    async fn list_active_questions(
        &self,
        language: &str,
        level: CefrLevel,
        question_type: Option<QuestionType>,
    ) -> PortResult<Vec<Question>>;

    async fn set_question_status(&self, question_id: Uuid, status: QuestionStatus)
        -> PortResult<()>;

    async fn increment_usage(&self, question_ids: &[Uuid]) -> PortResult<()>;
}

#[async_trait]
pub trait LearnerRepository: Send + Sync {
    // --- Users ---
    async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn update_user_settings(&self, user_id: Uuid, settings: &UserSettings)
        -> PortResult<User>;

    async fn list_user_ids(&self) -> PortResult<Vec<Uuid>>;

    // --- Learning preferences ---
    async fn get_preferences(&self, user_id: Uuid) -> PortResult<Option<LearningPreferences>>;

    /// Inserts `prefs` unless a row already exists, then returns the stored row.
    async fn create_preferences_if_absent(
        &self,
        prefs: &LearningPreferences,
    ) -> PortResult<LearningPreferences>;

    async fn update_preferences(&self, prefs: &LearningPreferences)
        -> PortResult<LearningPreferences>;

    // --- Question metadata ---
    async fn list_metadata(&self, user_id: Uuid) -> PortResult<Vec<UserQuestionMetadata>>;

    async fn get_metadata(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<UserQuestionMetadata>>;

    async fn upsert_metadata(&self, metadata: &UserQuestionMetadata) -> PortResult<()>;

    // --- Responses ---
    async fn record_response(&self, response: &UserResponse) -> PortResult<()>;

    /// All responses of a user, oldest first.
    async fn list_responses(&self, user_id: Uuid) -> PortResult<Vec<UserResponse>>;

    async fn list_topic_performance(&self, user_id: Uuid) -> PortResult<Vec<TopicPerformance>>;
}

#[async_trait]
pub trait PriorityRepository: Send + Sync {
    async fn list_priority_scores(&self, user_id: Uuid) -> PortResult<Vec<PriorityScore>>;

    async fn upsert_priority_scores(&self, scores: &[PriorityScore]) -> PortResult<()>;
}

#[async_trait]
pub trait DailyAssignmentRepository: Send + Sync {
    /// Assignments for one user and date, in creation order.
    async fn list_daily_assignments(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Vec<DailyAssignment>>;

    /// Atomically creates the set for (user, date). Returns `false` without writing
    /// anything when a set for that day already exists.
    async fn create_daily_set(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        question_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> PortResult<bool>;

    /// In one atomic step, drops the uncompleted assignments of (user, date), keeps the
    /// completed ones and adds `question_ids`. Creates the set if it did not exist.
    async fn replace_daily_set(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        question_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Marks one assignment completed unless it already is.
    /// Fails with `PortError::NotFound` when no such assignment exists.
    async fn complete_assignment(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        date: NaiveDate,
        answer_index: usize,
        completed_at: DateTime<Utc>,
    ) -> PortResult<Completion>;

    /// Distinct dates with assignments, most recent first.
    async fn list_assignment_dates(&self, user_id: Uuid) -> PortResult<Vec<NaiveDate>>;

    async fn list_assignments_for_question(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        since: NaiveDate,
    ) -> PortResult<Vec<DailyAssignment>>;
}

/// Everything the quiz engine needs from storage.
pub trait QuizStore:
    QuestionRepository + LearnerRepository + PriorityRepository + DailyAssignmentRepository
{
}

impl<T> QuizStore for T where
    T: QuestionRepository + LearnerRepository + PriorityRepository + DailyAssignmentRepository
{
}
