//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! storage ports from the `core` crate. It handles all interactions with the
//! PostgreSQL database using `sqlx`.

use adaptive_quiz_core::domain::{
    CefrLevel, DailyAssignment, LearningPreferences, PriorityScore, Question, QuestionContent,
    QuestionStatus, QuestionType, TopicPerformance, User, UserQuestionMetadata, UserResponse,
};
use adaptive_quiz_core::ports::{
    Completion, DailyAssignmentRepository, LearnerRepository, PortError, PortResult,
    PriorityRepository, QuestionRepository, UserSettings,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every storage port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn corrupt(what: &str, detail: String) -> PortError {
    PortError::Unexpected(format!("Corrupt {} row: {}", what, detail))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    preferred_language: Option<String>,
    current_level: Option<String>,
    timezone: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        let current_level = self
            .current_level
            .map(|l| l.parse::<CefrLevel>())
            .transpose()
            .map_err(|e| corrupt("user", e))?;
        Ok(User {
            user_id: self.user_id,
            preferred_language: self.preferred_language,
            current_level,
            timezone: self.timezone,
        })
    }
}

const QUESTION_COLUMNS: &str = "id, question_type, language, level, content, correct_answer, \
     explanation, topic, status, usage_count, created_at";

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    question_type: String,
    language: String,
    level: String,
    content: Json<QuestionContent>,
    correct_answer: i32,
    explanation: Option<String>,
    topic: Option<String>,
    status: String,
    usage_count: i32,
    created_at: DateTime<Utc>,
}
impl QuestionRecord {
    fn to_domain(self) -> PortResult<Question> {
        Ok(Question {
            id: self.id,
            question_type: self
                .question_type
                .parse::<QuestionType>()
                .map_err(|e| corrupt("question", e))?,
            language: self.language,
            level: self.level.parse::<CefrLevel>().map_err(|e| corrupt("question", e))?,
            content: self.content.0,
            correct_answer: self.correct_answer as usize,
            explanation: self.explanation,
            topic: self.topic,
            status: self.status.parse::<QuestionStatus>().map_err(|e| corrupt("question", e))?,
            usage_count: self.usage_count as u32,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct MetadataRecord {
    user_id: Uuid,
    question_id: Uuid,
    marked_as_known: bool,
    marked_as_known_at: Option<DateTime<Utc>>,
    confidence_level: Option<i16>,
    last_seen_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}
impl MetadataRecord {
    fn to_domain(self) -> UserQuestionMetadata {
        UserQuestionMetadata {
            user_id: self.user_id,
            question_id: self.question_id,
            marked_as_known: self.marked_as_known,
            marked_as_known_at: self.marked_as_known_at,
            confidence_level: self.confidence_level.map(|c| c as u8),
            last_seen_at: self.last_seen_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ResponseRecord {
    id: Uuid,
    user_id: Uuid,
    question_id: Uuid,
    answer_index: i32,
    is_correct: bool,
    response_time_ms: i32,
    confidence_level: Option<i16>,
    created_at: DateTime<Utc>,
}
impl ResponseRecord {
    fn to_domain(self) -> UserResponse {
        UserResponse {
            id: self.id,
            user_id: self.user_id,
            question_id: self.question_id,
            answer_index: self.answer_index as usize,
            is_correct: self.is_correct,
            response_time_ms: self.response_time_ms.max(0) as u32,
            confidence_level: self.confidence_level.map(|c| c as u8),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct PreferencesRecord {
    user_id: Uuid,
    focus_on_weak_areas: bool,
    include_review_questions: bool,
    fresh_question_ratio: f64,
    known_question_penalty: f64,
    weak_area_boost: f64,
    review_interval_days: i32,
    daily_goal: i32,
}
impl PreferencesRecord {
    fn to_domain(self) -> LearningPreferences {
        LearningPreferences {
            user_id: self.user_id,
            focus_on_weak_areas: self.focus_on_weak_areas,
            include_review_questions: self.include_review_questions,
            fresh_question_ratio: self.fresh_question_ratio,
            known_question_penalty: self.known_question_penalty,
            weak_area_boost: self.weak_area_boost,
            review_interval_days: self.review_interval_days.max(1) as u32,
            daily_goal: self.daily_goal.max(1) as u32,
        }
    }
}

const PREFERENCE_COLUMNS: &str = "user_id, focus_on_weak_areas, include_review_questions, \
     fresh_question_ratio, known_question_penalty, weak_area_boost, review_interval_days, daily_goal";

#[derive(FromRow)]
struct PriorityRecord {
    user_id: Uuid,
    question_id: Uuid,
    priority_score: f64,
    last_calculated_at: DateTime<Utc>,
}
impl PriorityRecord {
    fn to_domain(self) -> PriorityScore {
        PriorityScore {
            user_id: self.user_id,
            question_id: self.question_id,
            score: self.priority_score,
            last_calculated_at: self.last_calculated_at,
        }
    }
}

#[derive(FromRow)]
struct TopicRecord {
    topic: String,
    attempts: i64,
    correct: i64,
}

const ASSIGNMENT_COLUMNS: &str = "id, user_id, question_id, assignment_date, is_completed, \
     completed_at, user_answer_index, created_at";

#[derive(FromRow)]
struct AssignmentRecord {
    id: Uuid,
    user_id: Uuid,
    question_id: Uuid,
    assignment_date: NaiveDate,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    user_answer_index: Option<i32>,
    created_at: DateTime<Utc>,
}
impl AssignmentRecord {
    fn to_domain(self) -> DailyAssignment {
        DailyAssignment {
            id: self.id,
            user_id: self.user_id,
            question_id: self.question_id,
            assignment_date: self.assignment_date,
            is_completed: self.is_completed,
            completed_at: self.completed_at,
            user_answer_index: self.user_answer_index.map(|i| i as usize),
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `QuestionRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuestionRepository for DbAdapter {
    async fn save_question(&self, question: &Question) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO questions (id, question_type, language, level, content, correct_answer, \
             explanation, topic, status, usage_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(question.id)
        .bind(question.question_type.as_str())
        .bind(&question.language)
        .bind(question.level.as_str())
        .bind(Json(&question.content))
        .bind(question.correct_answer as i32)
        .bind(&question.explanation)
        .bind(&question.topic)
        .bind(question.status.as_str())
        .bind(question.usage_count as i32)
        .bind(question.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("Question {} already exists", question.id))
            }
            other => unexpected(other),
        })?;
        Ok(())
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions WHERE id = $1",
            QUESTION_COLUMNS
        ))
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Question {} not found", question_id)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn list_active_questions(
        &self,
        language: &str,
        level: CefrLevel,
        question_type: Option<QuestionType>,
    ) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions \
             WHERE status = 'active' AND language = $1 AND level = $2 \
             AND ($3::TEXT IS NULL OR question_type = $3) \
             ORDER BY created_at ASC, id ASC",
            QUESTION_COLUMNS
        ))
        .bind(language)
        .bind(level.as_str())
        .bind(question_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn set_question_status(
        &self,
        question_id: Uuid,
        status: QuestionStatus,
    ) -> PortResult<()> {
        let result = sqlx::query("UPDATE questions SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(question_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Question {} not found", question_id)));
        }
        Ok(())
    }

    async fn increment_usage(&self, question_ids: &[Uuid]) -> PortResult<()> {
        sqlx::query("UPDATE questions SET usage_count = usage_count + 1 WHERE id = ANY($1)")
            .bind(question_ids)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `LearnerRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl LearnerRepository for DbAdapter {
    async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<User> {
        sqlx::query("INSERT INTO users (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        self.get_user(user_id).await
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, preferred_language, current_level, timezone FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn update_user_settings(
        &self,
        user_id: Uuid,
        settings: &UserSettings,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "UPDATE users SET \
             preferred_language = COALESCE($2, preferred_language), \
             current_level = COALESCE($3, current_level), \
             timezone = COALESCE($4, timezone) \
             WHERE user_id = $1 \
             RETURNING user_id, preferred_language, current_level, timezone",
        )
        .bind(user_id)
        .bind(&settings.preferred_language)
        .bind(settings.current_level.map(|l| l.as_str()))
        .bind(&settings.timezone)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        record.to_domain()
    }

    async fn list_user_ids(&self) -> PortResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM users ORDER BY user_id")
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn get_preferences(&self, user_id: Uuid) -> PortResult<Option<LearningPreferences>> {
        let record = sqlx::query_as::<_, PreferencesRecord>(&format!(
            "SELECT {} FROM user_learning_preferences WHERE user_id = $1",
            PREFERENCE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn create_preferences_if_absent(
        &self,
        prefs: &LearningPreferences,
    ) -> PortResult<LearningPreferences> {
        sqlx::query(
            "INSERT INTO user_learning_preferences (user_id, focus_on_weak_areas, \
             include_review_questions, fresh_question_ratio, known_question_penalty, \
             weak_area_boost, review_interval_days, daily_goal) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(prefs.user_id)
        .bind(prefs.focus_on_weak_areas)
        .bind(prefs.include_review_questions)
        .bind(prefs.fresh_question_ratio)
        .bind(prefs.known_question_penalty)
        .bind(prefs.weak_area_boost)
        .bind(prefs.review_interval_days as i32)
        .bind(prefs.daily_goal as i32)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        self.get_preferences(prefs.user_id).await?.ok_or_else(|| {
            PortError::Unexpected(format!("Preferences for user {} vanished", prefs.user_id))
        })
    }

    async fn update_preferences(
        &self,
        prefs: &LearningPreferences,
    ) -> PortResult<LearningPreferences> {
        let record = sqlx::query_as::<_, PreferencesRecord>(&format!(
            "UPDATE user_learning_preferences SET focus_on_weak_areas = $2, \
             include_review_questions = $3, fresh_question_ratio = $4, \
             known_question_penalty = $5, weak_area_boost = $6, review_interval_days = $7, \
             daily_goal = $8, updated_at = NOW() \
             WHERE user_id = $1 RETURNING {}",
            PREFERENCE_COLUMNS
        ))
        .bind(prefs.user_id)
        .bind(prefs.focus_on_weak_areas)
        .bind(prefs.include_review_questions)
        .bind(prefs.fresh_question_ratio)
        .bind(prefs.known_question_penalty)
        .bind(prefs.weak_area_boost)
        .bind(prefs.review_interval_days as i32)
        .bind(prefs.daily_goal as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| {
            PortError::NotFound(format!("Preferences for user {} not found", prefs.user_id))
        })?;
        Ok(record.to_domain())
    }

    async fn list_metadata(&self, user_id: Uuid) -> PortResult<Vec<UserQuestionMetadata>> {
        let records = sqlx::query_as::<_, MetadataRecord>(
            "SELECT user_id, question_id, marked_as_known, marked_as_known_at, confidence_level, \
             last_seen_at, updated_at FROM user_question_metadata WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_metadata(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<UserQuestionMetadata>> {
        let record = sqlx::query_as::<_, MetadataRecord>(
            "SELECT user_id, question_id, marked_as_known, marked_as_known_at, confidence_level, \
             last_seen_at, updated_at FROM user_question_metadata \
             WHERE user_id = $1 AND question_id = $2",
        )
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn upsert_metadata(&self, metadata: &UserQuestionMetadata) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_question_metadata (user_id, question_id, marked_as_known, \
             marked_as_known_at, confidence_level, last_seen_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, question_id) DO UPDATE SET \
             marked_as_known = EXCLUDED.marked_as_known, \
             marked_as_known_at = EXCLUDED.marked_as_known_at, \
             confidence_level = EXCLUDED.confidence_level, \
             last_seen_at = EXCLUDED.last_seen_at, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(metadata.user_id)
        .bind(metadata.question_id)
        .bind(metadata.marked_as_known)
        .bind(metadata.marked_as_known_at)
        .bind(metadata.confidence_level.map(i16::from))
        .bind(metadata.last_seen_at)
        .bind(metadata.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn record_response(&self, response: &UserResponse) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_responses (id, user_id, question_id, answer_index, is_correct, \
             response_time_ms, confidence_level, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(response.id)
        .bind(response.user_id)
        .bind(response.question_id)
        .bind(response.answer_index as i32)
        .bind(response.is_correct)
        .bind(response.response_time_ms.min(i32::MAX as u32) as i32)
        .bind(response.confidence_level.map(i16::from))
        .bind(response.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn list_responses(&self, user_id: Uuid) -> PortResult<Vec<UserResponse>> {
        let records = sqlx::query_as::<_, ResponseRecord>(
            "SELECT id, user_id, question_id, answer_index, is_correct, response_time_ms, \
             confidence_level, created_at FROM user_responses \
             WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_topic_performance(&self, user_id: Uuid) -> PortResult<Vec<TopicPerformance>> {
        let records = sqlx::query_as::<_, TopicRecord>(
            "SELECT q.topic AS topic, COUNT(*) AS attempts, \
             COUNT(*) FILTER (WHERE r.is_correct) AS correct \
             FROM user_responses r JOIN questions q ON q.id = r.question_id \
             WHERE r.user_id = $1 AND q.topic IS NOT NULL \
             GROUP BY q.topic",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| TopicPerformance {
                topic: r.topic,
                attempts: r.attempts as u32,
                correct: r.correct as u32,
            })
            .collect())
    }
}

//=========================================================================================
// `PriorityRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl PriorityRepository for DbAdapter {
    async fn list_priority_scores(&self, user_id: Uuid) -> PortResult<Vec<PriorityScore>> {
        let records = sqlx::query_as::<_, PriorityRecord>(
            "SELECT user_id, question_id, priority_score, last_calculated_at \
             FROM question_priority_scores WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn upsert_priority_scores(&self, scores: &[PriorityScore]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        for score in scores {
            sqlx::query(
                "INSERT INTO question_priority_scores \
                 (user_id, question_id, priority_score, last_calculated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (user_id, question_id) DO UPDATE SET \
                 priority_score = EXCLUDED.priority_score, \
                 last_calculated_at = EXCLUDED.last_calculated_at",
            )
            .bind(score.user_id)
            .bind(score.question_id)
            .bind(score.score)
            .bind(score.last_calculated_at)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `DailyAssignmentRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl DailyAssignmentRepository for DbAdapter {
    async fn list_daily_assignments(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Vec<DailyAssignment>> {
        let records = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM daily_question_assignments \
             WHERE user_id = $1 AND assignment_date = $2 ORDER BY position ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_daily_set(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        question_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // A concurrent builder blocks here on the primary key until the winner commits,
        // then inserts nothing.
        let header = sqlx::query(
            "INSERT INTO daily_assignment_sets (user_id, assignment_date, created_at) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id, assignment_date) DO NOTHING",
        )
        .bind(user_id)
        .bind(date)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if header.rows_affected() == 0 {
            tx.rollback().await.map_err(unexpected)?;
            return Ok(false);
        }

        for (position, question_id) in question_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO daily_question_assignments \
                 (id, user_id, question_id, assignment_date, position, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (user_id, question_id, assignment_date) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(question_id)
            .bind(date)
            .bind(position as i32)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(true)
    }

    async fn replace_daily_set(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        question_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO daily_assignment_sets (user_id, assignment_date, created_at) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id, assignment_date) DO NOTHING",
        )
        .bind(user_id)
        .bind(date)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        // Serializes concurrent regenerations of the same day.
        sqlx::query(
            "SELECT 1 FROM daily_assignment_sets \
             WHERE user_id = $1 AND assignment_date = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query(
            "DELETE FROM daily_question_assignments \
             WHERE user_id = $1 AND assignment_date = $2 AND is_completed = FALSE",
        )
        .bind(user_id)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        let next_position: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM daily_question_assignments \
             WHERE user_id = $1 AND assignment_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        for (offset, question_id) in question_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO daily_question_assignments \
                 (id, user_id, question_id, assignment_date, position, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (user_id, question_id, assignment_date) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(question_id)
            .bind(date)
            .bind(next_position + offset as i32)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
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
        let updated = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "UPDATE daily_question_assignments \
             SET is_completed = TRUE, completed_at = $4, user_answer_index = $5 \
             WHERE user_id = $1 AND question_id = $2 AND assignment_date = $3 \
             AND is_completed = FALSE \
             RETURNING {}",
            ASSIGNMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(question_id)
        .bind(date)
        .bind(completed_at)
        .bind(answer_index as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        if let Some(record) = updated {
            return Ok(Completion::Completed(record.to_domain()));
        }

        let existing = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM daily_question_assignments \
             WHERE user_id = $1 AND question_id = $2 AND assignment_date = $3",
            ASSIGNMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(question_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!(
                "Assignment for question {} on {} not found",
                question_id, date
            )),
            _ => unexpected(e),
        })?;
        Ok(Completion::AlreadyCompleted(existing.to_domain()))
    }

    async fn list_assignment_dates(&self, user_id: Uuid) -> PortResult<Vec<NaiveDate>> {
        sqlx::query_scalar::<_, NaiveDate>(
            "SELECT DISTINCT assignment_date FROM daily_question_assignments \
             WHERE user_id = $1 ORDER BY assignment_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn list_assignments_for_question(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        since: NaiveDate,
    ) -> PortResult<Vec<DailyAssignment>> {
        let records = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM daily_question_assignments \
             WHERE user_id = $1 AND question_id = $2 AND assignment_date >= $3 \
             ORDER BY assignment_date ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(question_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
