//! services/api/src/web/insights.rs
//!
//! Read-only views of a learner's progress and priority scores.

use crate::web::{rest::to_http, state::AppState};
use adaptive_quiz_core::{LearningProgress, PriorityInsights, TopicPerformance};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_INSIGHTS_LIMIT: usize = 10;

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct TopicView {
    pub topic: String,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    /// Percentage, 0 to 100.
    pub accuracy_rate: f64,
}

impl From<&TopicPerformance> for TopicView {
    fn from(t: &TopicPerformance) -> Self {
        Self {
            topic: t.topic.clone(),
            total_attempts: t.attempts,
            correct_attempts: t.correct,
            accuracy_rate: t.accuracy() * 100.0,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ActivityView {
    pub question_id: Uuid,
    pub user_answer_index: usize,
    pub is_correct: bool,
    pub response_time_ms: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct ProgressResponse {
    pub total_questions: usize,
    pub correct_answers: usize,
    /// Percentage, 0 to 100.
    pub accuracy_rate: f64,
    pub topics: Vec<TopicView>,
    /// Topics with at least 3 attempts and under 60% accuracy, weakest first.
    pub weak_areas: Vec<TopicView>,
    /// The last 10 answers, newest first.
    pub recent_activity: Vec<ActivityView>,
    pub current_level: String,
    /// Set only after 20 answers with accuracy above 85% or below 50%.
    pub suggested_level: Option<String>,
}

impl From<LearningProgress> for ProgressResponse {
    fn from(p: LearningProgress) -> Self {
        Self {
            total_questions: p.total_answers,
            correct_answers: p.correct_answers,
            accuracy_rate: p.accuracy_rate,
            topics: p.topics.iter().map(TopicView::from).collect(),
            weak_areas: p.weak_areas.iter().map(TopicView::from).collect(),
            recent_activity: p
                .recent_activity
                .iter()
                .map(|r| ActivityView {
                    question_id: r.question_id,
                    user_answer_index: r.answer_index,
                    is_correct: r.is_correct,
                    response_time_ms: r.response_time_ms,
                    created_at: r.created_at,
                })
                .collect(),
            current_level: p.current_level.to_string(),
            suggested_level: p.suggested_level.map(|l| l.to_string()),
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InsightsQuery {
    /// Maximum questions and topics listed, 10 when omitted.
    pub limit: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct DistributionView {
    /// Scores above 200.
    pub high: usize,
    /// Scores from 100 to 200.
    pub medium: usize,
    /// Positive scores below 100.
    pub low: usize,
    pub average: f64,
}

#[derive(Serialize, ToSchema)]
pub struct HighPriorityQuestionView {
    pub question_id: Uuid,
    pub question_type: String,
    pub level: String,
    pub topic: Option<String>,
    pub priority_score: f64,
}

#[derive(Serialize, ToSchema)]
pub struct PriorityInsightsResponse {
    pub distribution: DistributionView,
    pub high_priority_questions: Vec<HighPriorityQuestionView>,
    /// Answered topics, lowest accuracy first.
    pub weak_areas: Vec<TopicView>,
}

impl From<PriorityInsights> for PriorityInsightsResponse {
    fn from(i: PriorityInsights) -> Self {
        Self {
            distribution: DistributionView {
                high: i.distribution.high,
                medium: i.distribution.medium,
                low: i.distribution.low,
                average: i.distribution.average,
            },
            high_priority_questions: i
                .high_priority_questions
                .into_iter()
                .map(|q| HighPriorityQuestionView {
                    question_id: q.question_id,
                    question_type: q.question_type.to_string(),
                    level: q.level.to_string(),
                    topic: q.topic,
                    priority_score: q.priority_score,
                })
                .collect(),
            weak_areas: i.weak_areas.iter().map(TopicView::from).collect(),
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Overall accuracy, per-topic results, recent answers and a level suggestion.
#[utoipa::path(
    get,
    path = "/quiz/progress",
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses((status = 200, description = "Learning progress", body = ProgressResponse))
)]
pub async fn progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let progress = app_state
        .quiz
        .learning_progress(user_id)
        .await
        .map_err(|e| to_http(e, "Failed to load learning progress"))?;
    Ok(Json(ProgressResponse::from(progress)))
}

#[utoipa::path(
    get,
    path = "/quiz/priority-insights",
    params(
        InsightsQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "Priority score spread, urgent questions and weak topics", body = PriorityInsightsResponse),
        (status = 400, description = "limit is zero")
    )
)]
pub async fn priority_insights_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<InsightsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let insights = app_state
        .quiz
        .priority_insights(user_id, query.limit.unwrap_or(DEFAULT_INSIGHTS_LIMIT))
        .await
        .map_err(|e| to_http(e, "Failed to load priority insights"))?;
    Ok(Json(PriorityInsightsResponse::from(insights)))
}
