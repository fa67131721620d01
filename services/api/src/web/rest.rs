//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the interactive quiz endpoints, the view types
//! shared by all handlers, and the master definition for the OpenAPI specification.

use crate::web::state::AppState;
use adaptive_quiz_core::{
    AnswerSubmission, CefrLevel, NextQuestion, NextQuestionRequest, Pool, Question,
    QuestionContent, QuestionStatus, QuestionType, QuizError,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        next_question_handler,
        submit_answer_handler,
        mark_known_handler,
        report_question_handler,
        create_question_handler,
        crate::web::settings::get_preferences_handler,
        crate::web::settings::update_preferences_handler,
        crate::web::settings::update_settings_handler,
        crate::web::daily::today_handler,
        crate::web::daily::daily_questions_handler,
        crate::web::daily::daily_answer_handler,
        crate::web::daily::regenerate_handler,
        crate::web::daily::progress_handler,
        crate::web::daily::dates_handler,
        crate::web::daily::history_handler,
        crate::web::insights::progress_handler,
        crate::web::insights::priority_insights_handler,
    ),
    components(
        schemas(
            QuestionView,
            NextQuestionResponse,
            AnswerRequest,
            AnswerResponse,
            MarkKnownRequest,
            MarkKnownResponse,
            CreateQuestionRequest,
            crate::web::settings::PreferencesPayload,
            crate::web::settings::SettingsRequest,
            crate::web::settings::UserView,
            crate::web::daily::DailySetResponse,
            crate::web::daily::DailyQuestionView,
            crate::web::daily::DailyAnswerRequest,
            crate::web::daily::DailyAnswerResponse,
            crate::web::daily::DailyProgressResponse,
            crate::web::daily::DailyDatesResponse,
            crate::web::daily::DailyHistoryEntry,
            crate::web::insights::TopicView,
            crate::web::insights::ActivityView,
            crate::web::insights::ProgressResponse,
            crate::web::insights::DistributionView,
            crate::web::insights::HighPriorityQuestionView,
            crate::web::insights::PriorityInsightsResponse,
        )
    ),
    tags(
        (name = "Adaptive Quiz API", description = "Adaptive question selection and daily assignments.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps an engine error to the status code and message sent to the client.
pub(crate) fn to_http(err: QuizError, context: &str) -> (StatusCode, String) {
    match err {
        QuizError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        QuizError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        QuizError::IncompleteProfile(msg) => {
            warn!("{}: {}", context, msg);
            (StatusCode::CONFLICT, msg)
        }
        QuizError::Port(e) => {
            error!("{}: {:?}", context, e);
            (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}

fn bad_request(msg: String) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg)
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A question as shown to the learner. The correct answer is not included.
#[derive(Serialize, ToSchema)]
pub struct QuestionView {
    pub id: Uuid,
    pub question_type: String,
    pub language: String,
    pub level: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub passage: Option<String>,
    pub topic: Option<String>,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type.to_string(),
            language: q.language.clone(),
            level: q.level.to_string(),
            prompt: q.content.prompt.clone(),
            options: q.content.options.clone(),
            passage: q.content.passage.clone(),
            topic: q.topic.clone(),
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NextQuestionQuery {
    /// Restrict to one question type, e.g. `vocabulary`.
    #[serde(rename = "type")]
    pub question_type: Option<String>,
    /// Overrides the learner's preferred language.
    pub language: Option<String>,
    /// Overrides the learner's current level.
    pub level: Option<String>,
}

/// `status` is `ready` or `generation_in_progress`.
#[derive(Serialize, ToSchema)]
pub struct NextQuestionResponse {
    pub status: String,
    pub question: Option<QuestionView>,
    /// `fresh` or `review`.
    pub pool: Option<String>,
    pub priority_score: Option<f64>,
    pub message: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AnswerRequest {
    pub question_id: Uuid,
    pub answer_index: usize,
    #[serde(default)]
    pub response_time_ms: u32,
    pub confidence_level: Option<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct AnswerResponse {
    pub response_id: Uuid,
    pub is_correct: bool,
    pub correct_answer: usize,
    pub user_answer_index: usize,
    pub explanation: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct MarkKnownRequest {
    /// 1 (unsure) to 5 (certain).
    pub confidence_level: Option<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct MarkKnownResponse {
    pub question_id: Uuid,
    pub marked_as_known: bool,
    pub confidence_level: Option<u8>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateQuestionRequest {
    pub question_type: String,
    pub language: String,
    pub level: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub passage: Option<String>,
    pub correct_answer: usize,
    pub explanation: Option<String>,
    pub topic: Option<String>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Get the next question for the learner.
///
/// Returns `generation_in_progress` with 200 when nothing qualifies yet.
#[utoipa::path(
    get,
    path = "/quiz/next",
    params(
        NextQuestionQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "A question, or the no-questions state", body = NextQuestionResponse),
        (status = 400, description = "Invalid filter"),
        (status = 409, description = "Language or level not set")
    )
)]
pub async fn next_question_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<NextQuestionQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let request = NextQuestionRequest {
        question_type: query
            .question_type
            .as_deref()
            .map(str::parse::<QuestionType>)
            .transpose()
            .map_err(bad_request)?,
        language: query.language,
        level: query
            .level
            .as_deref()
            .map(str::parse::<CefrLevel>)
            .transpose()
            .map_err(bad_request)?,
    };

    let next = app_state
        .quiz
        .next_question(user_id, request, Utc::now())
        .await
        .map_err(|e| to_http(e, "Failed to select the next question"))?;

    let response = match next {
        NextQuestion::Ready(served) => NextQuestionResponse {
            status: "ready".to_string(),
            question: Some(QuestionView::from(&served.question)),
            pool: Some(
                match served.pool {
                    Pool::Fresh => "fresh",
                    Pool::Review => "review",
                }
                .to_string(),
            ),
            priority_score: Some(served.priority_score),
            message: None,
        },
        NextQuestion::NoQuestionsAvailable(info) => NextQuestionResponse {
            status: "generation_in_progress".to_string(),
            question: None,
            pool: None,
            priority_score: None,
            message: Some(info.to_string()),
        },
    };
    Ok(Json(response))
}

/// Submit an answer in the interactive flow.
#[utoipa::path(
    post,
    path = "/quiz/answer",
    request_body = AnswerRequest,
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses(
        (status = 200, description = "Answer recorded", body = AnswerResponse),
        (status = 400, description = "Answer index out of range"),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn submit_answer_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let submission = AnswerSubmission {
        answer_index: req.answer_index,
        response_time_ms: req.response_time_ms,
        confidence_level: req.confidence_level,
    };
    let result = app_state
        .quiz
        .submit_answer(user_id, req.question_id, submission, Utc::now())
        .await
        .map_err(|e| to_http(e, "Failed to record answer"))?;

    Ok(Json(AnswerResponse {
        response_id: result.response.id,
        is_correct: result.response.is_correct,
        correct_answer: result.correct_answer,
        user_answer_index: result.response.answer_index,
        explanation: result.explanation,
    }))
}

/// Mark a question as known.
#[utoipa::path(
    post,
    path = "/quiz/questions/{id}/known",
    request_body = MarkKnownRequest,
    params(
        ("id" = Uuid, Path, description = "Question ID"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 200, description = "Question marked as known", body = MarkKnownResponse),
        (status = 400, description = "Confidence outside 1-5"),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn mark_known_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(question_id): Path<Uuid>,
    Json(req): Json<MarkKnownRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let metadata = app_state
        .quiz
        .mark_known(user_id, question_id, req.confidence_level, Utc::now())
        .await
        .map_err(|e| to_http(e, "Failed to mark question as known"))?;

    Ok(Json(MarkKnownResponse {
        question_id,
        marked_as_known: metadata.marked_as_known,
        confidence_level: metadata.confidence_level,
    }))
}

/// Report a broken question. It stops being served to anyone.
#[utoipa::path(
    post,
    path = "/quiz/questions/{id}/report",
    params(
        ("id" = Uuid, Path, description = "Question ID"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    ),
    responses(
        (status = 204, description = "Question retired"),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn report_question_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(question_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .quiz
        .report_question(user_id, question_id)
        .await
        .map_err(|e| to_http(e, "Failed to report question"))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Store a question produced by the generation worker.
#[utoipa::path(
    post,
    path = "/questions",
    request_body = CreateQuestionRequest,
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the caller.")),
    responses(
        (status = 201, description = "Question stored", body = QuestionView),
        (status = 400, description = "Malformed question")
    )
)]
pub async fn create_question_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let question = Question {
        id: Uuid::new_v4(),
        question_type: req.question_type.parse().map_err(bad_request)?,
        language: req.language,
        level: req.level.parse().map_err(bad_request)?,
        content: QuestionContent {
            prompt: req.prompt,
            options: req.options,
            passage: req.passage,
        },
        correct_answer: req.correct_answer,
        explanation: req.explanation,
        topic: req.topic,
        status: QuestionStatus::Active,
        usage_count: 0,
        created_at: Utc::now(),
    };

    let stored = app_state
        .quiz
        .save_question(question)
        .await
        .map_err(|e| to_http(e, "Failed to store question"))?;
    Ok((StatusCode::CREATED, Json(QuestionView::from(&stored))))
}
