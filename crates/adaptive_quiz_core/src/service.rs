//! crates/adaptive_quiz_core/src/service.rs
//!
//! The interactive quiz flow and the per-user settings around it. One `QuizService`
//! is built at startup and shared by every request handler.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar;
use crate::daily::DailyAssignmentBuilder;
use crate::domain::{
    CefrLevel, LearningPreferences, Question, QuestionStatus, QuestionType, User,
    UserQuestionMetadata, UserResponse,
};
use crate::eligibility::{
    load_candidates, partition, EligibilityRequest, EligibilityRules, NoQuestionsAvailable,
    SelectionFlow,
};
use crate::error::{QuizError, QuizResult};
use crate::insights::{
    score_distribution, top_scores, weakest_first, HighPriorityQuestion, LearningProgress,
    PriorityInsights,
};
use crate::ports::{PortError, QuizStore, UserSettings};
use crate::selector::{shared_rng, Pool, SelectionMode, Selector, SharedRng, WeightContext};

/// Deployment-level knobs of the selection engine.
#[derive(Debug, Clone, Default)]
pub struct QuizConfig {
    pub rules: EligibilityRules,
    pub selection_mode: SelectionMode,
    /// Fixed seed for reproducible selection; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

//=========================================================================================
// Requests and results
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct NextQuestionRequest {
    pub question_type: Option<QuestionType>,
    /// Overrides the user's preferred language.
    pub language: Option<String>,
    /// Overrides the user's current level.
    pub level: Option<CefrLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServedQuestion {
    pub question: Question,
    pub pool: Pool,
    pub priority_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextQuestion {
    Ready(ServedQuestion),
    /// Nothing qualifies yet; generation has to catch up.
    NoQuestionsAvailable(NoQuestionsAvailable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerSubmission {
    pub answer_index: usize,
    pub response_time_ms: u32,
    /// Optional self-reported confidence, 1 to 5.
    pub confidence_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerResult {
    pub response: UserResponse,
    pub correct_answer: usize,
    pub explanation: Option<String>,
}

//=========================================================================================
// Helpers shared with the daily flow
//=========================================================================================

/// The user's language and level, or `IncompleteProfile` if either is unset.
pub(crate) async fn learner_profile(
    store: &dyn QuizStore,
    user_id: Uuid,
) -> QuizResult<(String, CefrLevel)> {
    let user = store.get_user(user_id).await?;
    match (user.preferred_language, user.current_level) {
        (Some(language), Some(level)) => Ok((language, level)),
        _ => Err(QuizError::IncompleteProfile(
            "preferred language and current level must be set".to_string(),
        )),
    }
}

/// Appends the response to the log and touches the per-question metadata.
pub(crate) async fn record_answer(
    store: &dyn QuizStore,
    user_id: Uuid,
    question: &Question,
    submission: &AnswerSubmission,
    now: DateTime<Utc>,
) -> QuizResult<UserResponse> {
    validate_confidence(submission.confidence_level)?;
    let response = UserResponse {
        id: Uuid::new_v4(),
        user_id,
        question_id: question.id,
        answer_index: submission.answer_index,
        is_correct: submission.answer_index == question.correct_answer,
        response_time_ms: submission.response_time_ms,
        confidence_level: submission.confidence_level,
        created_at: now,
    };
    store.record_response(&response).await?;

    let mut metadata = store
        .get_metadata(user_id, question.id)
        .await?
        .unwrap_or_else(|| UserQuestionMetadata::new(user_id, question.id, now));
    metadata.last_seen_at = Some(now);
    metadata.updated_at = now;
    store.upsert_metadata(&metadata).await?;

    Ok(response)
}

pub(crate) fn validate_confidence(confidence: Option<u8>) -> QuizResult<()> {
    match confidence {
        Some(c) if !(1..=5).contains(&c) => Err(QuizError::InvalidInput(format!(
            "confidence level must be between 1 and 5, got {}",
            c
        ))),
        _ => Ok(()),
    }
}

fn normalize_language(language: &str) -> QuizResult<String> {
    let language = language.trim().to_lowercase();
    if language.is_empty() {
        return Err(QuizError::InvalidInput("language must not be empty".to_string()));
    }
    Ok(language)
}

//=========================================================================================
// Service
//=========================================================================================

pub struct QuizService {
    store: Arc<dyn QuizStore>,
    config: QuizConfig,
    rng: SharedRng,
}

impl QuizService {
    pub fn new(store: Arc<dyn QuizStore>, config: QuizConfig) -> Self {
        let rng = shared_rng(config.rng_seed);
        Self { store, config, rng }
    }

    /// A daily builder over the same store, rules and random source.
    pub fn daily_builder(&self) -> DailyAssignmentBuilder {
        DailyAssignmentBuilder::new(
            self.store.clone(),
            self.config.rules.clone(),
            self.config.selection_mode,
            self.rng.clone(),
        )
    }

    pub fn store(&self) -> Arc<dyn QuizStore> {
        self.store.clone()
    }

    pub async fn next_question(
        &self,
        user_id: Uuid,
        request: NextQuestionRequest,
        now: DateTime<Utc>,
    ) -> QuizResult<NextQuestion> {
        let user = self.store.get_user(user_id).await?;
        let language = match request.language.as_deref().or(user.preferred_language.as_deref()) {
            Some(language) => normalize_language(language)?,
            None => {
                return Err(QuizError::IncompleteProfile("preferred language is not set".to_string()))
            }
        };
        let level = request.level.or(user.current_level).ok_or_else(|| {
            QuizError::IncompleteProfile("current level is not set".to_string())
        })?;

        let prefs = self.learning_preferences(user_id).await?;
        let set =
            load_candidates(&*self.store, user_id, &language, level, request.question_type).await?;
        let excluded = HashSet::new();
        let eligibility = EligibilityRequest {
            language: &language,
            level,
            question_type: request.question_type,
            flow: SelectionFlow::Interactive,
            now,
            excluded: &excluded,
        };

        let pools = match partition(set.candidates, &eligibility, &prefs, &self.config.rules) {
            Ok(pools) => pools,
            Err(none) => {
                info!(%user_id, "{}", none);
                return Ok(NextQuestion::NoQuestionsAvailable(none));
            }
        };

        let picked = {
            let mut rng = self.rng.lock();
            let weights = WeightContext { prefs: &prefs, weak_topics: &set.weak_topics };
            Selector::new(self.config.selection_mode, weights, &mut *rng).select_one(pools)
        };
        // partition only succeeds with a non-empty pool
        let Some((candidate, pool)) = picked else {
            return Err(QuizError::NotFound("no question could be selected".to_string()));
        };

        self.store.increment_usage(&[candidate.id()]).await?;
        debug!(%user_id, question_id = %candidate.id(), ?pool, "Serving question");
        Ok(NextQuestion::Ready(ServedQuestion {
            priority_score: candidate.priority_score(),
            question: candidate.question,
            pool,
        }))
    }

    pub async fn submit_answer(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        submission: AnswerSubmission,
        now: DateTime<Utc>,
    ) -> QuizResult<AnswerResult> {
        let question = self.store.get_question(question_id).await?;
        if question.option_text(submission.answer_index).is_none() {
            return Err(QuizError::InvalidInput(format!(
                "answer index {} out of range for {} options",
                submission.answer_index,
                question.content.options.len()
            )));
        }
        let response = record_answer(&*self.store, user_id, &question, &submission, now).await?;
        Ok(AnswerResult {
            response,
            correct_answer: question.correct_answer,
            explanation: question.explanation,
        })
    }

    /// Marks a question as known with a confidence between 1 and 5.
    pub async fn mark_known(
        &self,
        user_id: Uuid,
        question_id: Uuid,
        confidence: Option<u8>,
        now: DateTime<Utc>,
    ) -> QuizResult<UserQuestionMetadata> {
        validate_confidence(confidence)?;
        self.store.get_question(question_id).await?;

        let mut metadata = self
            .store
            .get_metadata(user_id, question_id)
            .await?
            .unwrap_or_else(|| UserQuestionMetadata::new(user_id, question_id, now));
        metadata.marked_as_known = true;
        metadata.marked_as_known_at = Some(now);
        metadata.confidence_level = confidence;
        metadata.updated_at = now;
        self.store.upsert_metadata(&metadata).await?;

        info!(%user_id, %question_id, ?confidence, "Question marked as known");
        Ok(metadata)
    }

    /// Retires a question for everyone.
    pub async fn report_question(&self, user_id: Uuid, question_id: Uuid) -> QuizResult<()> {
        self.store.set_question_status(question_id, QuestionStatus::Reported).await?;
        info!(%user_id, %question_id, "Question reported and retired");
        Ok(())
    }

    /// Stores a question produced by the generation worker.
    pub async fn save_question(&self, mut question: Question) -> QuizResult<Question> {
        question.language = normalize_language(&question.language)?;
        if question.content.prompt.trim().is_empty() {
            return Err(QuizError::InvalidInput("prompt must not be empty".to_string()));
        }
        if question.content.options.len() < 2 {
            return Err(QuizError::InvalidInput("a question needs at least two options".to_string()));
        }
        if question.option_text(question.correct_answer).is_none() {
            return Err(QuizError::InvalidInput(format!(
                "correct answer {} out of range for {} options",
                question.correct_answer,
                question.content.options.len()
            )));
        }
        self.store.save_question(&question).await?;
        debug!(question_id = %question.id, "Question stored");
        Ok(question)
    }

    /// Returns the user's preferences, creating the defaults on first access.
    pub async fn learning_preferences(&self, user_id: Uuid) -> QuizResult<LearningPreferences> {
        Ok(self
            .store
            .create_preferences_if_absent(&LearningPreferences::defaults_for(user_id))
            .await?)
    }

    pub async fn update_learning_preferences(
        &self,
        prefs: LearningPreferences,
    ) -> QuizResult<LearningPreferences> {
        prefs.validate().map_err(QuizError::InvalidInput)?;
        self.learning_preferences(prefs.user_id).await?;
        let updated = self.store.update_preferences(&prefs).await?;
        info!(user_id = %prefs.user_id, "Learning preferences updated");
        Ok(updated)
    }

    pub async fn update_settings(&self, user_id: Uuid, settings: UserSettings) -> QuizResult<User> {
        let mut settings = settings;
        if let Some(language) = settings.preferred_language.as_deref() {
            settings.preferred_language = Some(normalize_language(language)?);
        }
        if let Some(tz) = settings.timezone.as_deref() {
            if !calendar::is_valid_timezone(tz) {
                return Err(QuizError::InvalidInput(format!("unknown timezone '{}'", tz)));
            }
        }
        Ok(self.store.update_user_settings(user_id, &settings).await?)
    }

    /// Overall accuracy, per-topic results, recent answers and a level suggestion.
    /// A user without a level is treated as A1.
    pub async fn learning_progress(&self, user_id: Uuid) -> QuizResult<LearningProgress> {
        let user = self.store.get_user(user_id).await?;
        let responses = self.store.list_responses(user_id).await?;
        let topics = self.store.list_topic_performance(user_id).await?;
        Ok(LearningProgress::build(
            &responses,
            topics,
            user.current_level.unwrap_or(CefrLevel::A1),
        ))
    }

    /// How the user's priority scores are spread, their `limit` most urgent
    /// questions and their `limit` weakest topics.
    pub async fn priority_insights(&self, user_id: Uuid, limit: usize) -> QuizResult<PriorityInsights> {
        if limit == 0 {
            return Err(QuizError::InvalidInput("limit must be positive".to_string()));
        }
        let scores = self.store.list_priority_scores(user_id).await?;

        let mut high_priority_questions = Vec::new();
        for score in top_scores(&scores, limit) {
            let question = match self.store.get_question(score.question_id).await {
                Ok(question) => question,
                Err(PortError::NotFound(_)) => {
                    debug!(%user_id, question_id = %score.question_id, "Scored question no longer exists");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            high_priority_questions.push(HighPriorityQuestion {
                question_id: question.id,
                question_type: question.question_type,
                level: question.level,
                topic: question.topic,
                priority_score: score.score,
            });
        }

        let mut weak_areas = weakest_first(
            self.store
                .list_topic_performance(user_id)
                .await?
                .into_iter()
                .filter(|t| t.attempts > 0)
                .collect(),
        );
        weak_areas.truncate(limit);

        Ok(PriorityInsights {
            distribution: score_distribution(&scores),
            high_priority_questions,
            weak_areas,
        })
    }

    /// The user's current calendar date in their own timezone.
    pub async fn today_for(&self, user_id: Uuid, now: DateTime<Utc>) -> QuizResult<NaiveDate> {
        let user = self.store.get_user(user_id).await?;
        Ok(calendar::local_date(user.timezone.as_deref(), now))
    }
}
