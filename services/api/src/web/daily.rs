//! services/api/src/web/daily.rs
//!
//! Handlers for the daily assignment flow. Dates are calendar dates in the learner's
//! own timezone, formatted `YYYY-MM-DD`.

use crate::web::{
    rest::{to_http, QuestionView},
    state::AppState,
};
use adaptive_quiz_core::{AnswerSubmission, DailySet, DailyState, Supply};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_HISTORY_DAYS: u32 = 30;

//=========================================================================================
// Payloads
//=========================================================================================

/// `status` is `ready`, `partial` or `generation_in_progress`.
#[derive(Serialize, ToSchema)]
pub struct DailySetResponse {
    pub date: NaiveDate,
    pub status: String,
    /// `not_built`, `built`, `partially_completed` or `completed`.
    pub state: String,
    /// How many questions short of the daily goal the set is.
    pub missing: usize,
    pub questions: Vec<DailyQuestionView>,
    pub message: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DailyQuestionView {
    pub assignment_id: Uuid,
    pub question: QuestionView,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub user_answer_index: Option<usize>,
}

impl From<DailySet> for DailySetResponse {
    fn from(set: DailySet) -> Self {
        let state = match set.state() {
            DailyState::NotBuilt => "not_built",
            DailyState::Built => "built",
            DailyState::PartiallyCompleted => "partially_completed",
            DailyState::Completed => "completed",
        };
        let (status, message) = match &set.supply {
            Supply::Full => ("ready", None),
            Supply::Partial { .. } => ("partial", None),
            Supply::NoQuestionsAvailable(info) => ("generation_in_progress", Some(info.to_string())),
        };
        Self {
            date: set.date,
            status: status.to_string(),
            state: state.to_string(),
            missing: set.shortfall(),
            message,
            questions: set
                .items
                .iter()
                .map(|item| DailyQuestionView {
                    assignment_id: item.assignment.id,
                    question: QuestionView::from(&item.question),
                    is_completed: item.assignment.is_completed,
                    completed_at: item.assignment.completed_at,
                    user_answer_index: item.assignment.user_answer_index,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct DailyAnswerRequest {
    pub answer_index: usize,
    #[serde(default)]
    pub response_time_ms: u32,
    pub confidence_level: Option<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct DailyAnswerResponse {
    pub is_correct: bool,
    pub correct_answer: usize,
    pub explanation: Option<String>,
    pub user_answer_index: Option<usize>,
    pub completed_at: Option<DateTime<Utc>>,
    /// True when the assignment had already been answered; the stored answer is returned.
    pub already_completed: bool,
}

#[derive(Serialize, ToSchema)]
pub struct DailyProgressResponse {
    pub date: NaiveDate,
    pub completed: usize,
    pub total: usize,
}

#[derive(Serialize, ToSchema)]
pub struct DailyDatesResponse {
    /// Newest first.
    pub dates: Vec<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Look-back window in days, 30 when omitted.
    pub days: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct DailyHistoryEntry {
    pub assignment_date: NaiveDate,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_correct: Option<bool>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Get today's set, building it on first request.
#[utoipa::path(
    get,
    path = "/daily/today",
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses(
        (status = 200, description = "Today's assignments", body = DailySetResponse),
        (status = 409, description = "Language or level not set")
    )
)]
pub async fn today_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let now = Utc::now();
    let today = app_state
        .quiz
        .today_for(user_id, now)
        .await
        .map_err(|e| to_http(e, "Failed to resolve the local date"))?;
    let set = app_state
        .daily
        .ensure_daily_set(user_id, today, now)
        .await
        .map_err(|e| to_http(e, "Failed to build daily assignments"))?;
    Ok(Json(DailySetResponse::from(set)))
}

#[utoipa::path(
    get,
    path = "/daily/{date}",
    params(
        ("date" = String, Path, description = "Calendar date, YYYY-MM-DD"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "Assignments for the date", body = DailySetResponse),
        (status = 409, description = "Language or level not set")
    )
)]
pub async fn daily_questions_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(date): Path<NaiveDate>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let set = app_state
        .daily
        .ensure_daily_set(user_id, date, Utc::now())
        .await
        .map_err(|e| to_http(e, "Failed to build daily assignments"))?;
    Ok(Json(DailySetResponse::from(set)))
}

/// Answer one assignment of a day. A second answer is not recorded.
#[utoipa::path(
    post,
    path = "/daily/{date}/questions/{question_id}/answer",
    request_body = DailyAnswerRequest,
    params(
        ("date" = String, Path, description = "Calendar date, YYYY-MM-DD"),
        ("question_id" = Uuid, Path, description = "Question ID"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "Answer recorded, or the earlier answer", body = DailyAnswerResponse),
        (status = 400, description = "Answer index out of range"),
        (status = 404, description = "Question not assigned on that date")
    )
)]
pub async fn daily_answer_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((date, question_id)): Path<(NaiveDate, Uuid)>,
    Json(req): Json<DailyAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let submission = AnswerSubmission {
        answer_index: req.answer_index,
        response_time_ms: req.response_time_ms,
        confidence_level: req.confidence_level,
    };
    let answer = app_state
        .daily
        .submit_daily_answer(user_id, question_id, date, submission, Utc::now())
        .await
        .map_err(|e| to_http(e, "Failed to record daily answer"))?;

    Ok(Json(DailyAnswerResponse {
        is_correct: answer.is_correct,
        correct_answer: answer.correct_answer,
        explanation: answer.explanation,
        user_answer_index: answer.assignment.user_answer_index,
        completed_at: answer.assignment.completed_at,
        already_completed: answer.already_completed,
    }))
}

/// Replace the unanswered questions of a date. Answered ones are kept.
#[utoipa::path(
    post,
    path = "/daily/{date}/regenerate",
    params(
        ("date" = String, Path, description = "Calendar date, YYYY-MM-DD"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "The new set", body = DailySetResponse),
        (status = 409, description = "Language or level not set")
    )
)]
pub async fn regenerate_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(date): Path<NaiveDate>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let set = app_state
        .daily
        .regenerate_daily_set(user_id, date, Utc::now())
        .await
        .map_err(|e| to_http(e, "Failed to regenerate daily assignments"))?;
    Ok(Json(DailySetResponse::from(set)))
}

#[utoipa::path(
    get,
    path = "/daily/{date}/progress",
    params(
        ("date" = String, Path, description = "Calendar date, YYYY-MM-DD"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses((status = 200, description = "Completed and total counts", body = DailyProgressResponse))
)]
pub async fn progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(date): Path<NaiveDate>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let progress = app_state
        .daily
        .daily_progress(user_id, date)
        .await
        .map_err(|e| to_http(e, "Failed to load daily progress"))?;
    Ok(Json(DailyProgressResponse {
        date: progress.date,
        completed: progress.completed,
        total: progress.total,
    }))
}

/// Dates that have a set, newest first.
#[utoipa::path(
    get,
    path = "/daily/dates",
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses((status = 200, description = "Dates with assignments", body = DailyDatesResponse))
)]
pub async fn dates_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let dates = app_state
        .daily
        .available_dates(user_id)
        .await
        .map_err(|e| to_http(e, "Failed to list assignment dates"))?;
    Ok(Json(DailyDatesResponse { dates }))
}

/// How one question fared in past daily sets, oldest first.
#[utoipa::path(
    get,
    path = "/daily/history/{question_id}",
    params(
        HistoryQuery,
        ("question_id" = Uuid, Path, description = "Question ID"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "Past assignments of the question", body = Vec<DailyHistoryEntry>),
        (status = 400, description = "days is zero"),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(question_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let today = app_state
        .quiz
        .today_for(user_id, Utc::now())
        .await
        .map_err(|e| to_http(e, "Failed to resolve the local date"))?;
    let entries = app_state
        .daily
        .question_history(
            user_id,
            question_id,
            query.days.unwrap_or(DEFAULT_HISTORY_DAYS),
            today,
        )
        .await
        .map_err(|e| to_http(e, "Failed to load question history"))?;

    Ok(Json(
        entries
            .into_iter()
            .map(|e| DailyHistoryEntry {
                assignment_date: e.assignment_date,
                is_completed: e.is_completed,
                completed_at: e.completed_at,
                is_correct: e.is_correct,
            })
            .collect::<Vec<_>>(),
    ))
}
