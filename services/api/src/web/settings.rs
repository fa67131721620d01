//! services/api/src/web/settings.rs
//!
//! Handlers for learning preferences and the learner profile.

use crate::web::{rest::to_http, state::AppState};
use adaptive_quiz_core::{CefrLevel, LearningPreferences, User, UserSettings};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// The tunables of the selection engine for one learner.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct PreferencesPayload {
    pub focus_on_weak_areas: bool,
    pub include_review_questions: bool,
    /// Share of fresh questions, 0 to 1.
    pub fresh_question_ratio: f64,
    /// Weight multiplier for known questions, 0 to 1.
    pub known_question_penalty: f64,
    /// Weight multiplier for weak topics, 0.1 to 10.
    pub weak_area_boost: f64,
    pub review_interval_days: u32,
    pub daily_goal: u32,
}

impl PreferencesPayload {
    fn into_domain(self, user_id: Uuid) -> LearningPreferences {
        LearningPreferences {
            user_id,
            focus_on_weak_areas: self.focus_on_weak_areas,
            include_review_questions: self.include_review_questions,
            fresh_question_ratio: self.fresh_question_ratio,
            known_question_penalty: self.known_question_penalty,
            weak_area_boost: self.weak_area_boost,
            review_interval_days: self.review_interval_days,
            daily_goal: self.daily_goal,
        }
    }
}

impl From<LearningPreferences> for PreferencesPayload {
    fn from(p: LearningPreferences) -> Self {
        Self {
            focus_on_weak_areas: p.focus_on_weak_areas,
            include_review_questions: p.include_review_questions,
            fresh_question_ratio: p.fresh_question_ratio,
            known_question_penalty: p.known_question_penalty,
            weak_area_boost: p.weak_area_boost,
            review_interval_days: p.review_interval_days,
            daily_goal: p.daily_goal,
        }
    }
}

/// Fields left out are not changed.
#[derive(Deserialize, ToSchema)]
pub struct SettingsRequest {
    pub preferred_language: Option<String>,
    /// CEFR level, `A1` to `C2`.
    pub current_level: Option<String>,
    /// IANA timezone name, e.g. `Europe/Rome`.
    pub timezone: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UserView {
    pub user_id: Uuid,
    pub preferred_language: Option<String>,
    pub current_level: Option<String>,
    pub timezone: Option<String>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            preferred_language: u.preferred_language,
            current_level: u.current_level.map(|l| l.to_string()),
            timezone: u.timezone,
        }
    }
}

/// Read the learner's preferences. Defaults are created on first access.
#[utoipa::path(
    get,
    path = "/preferences/learning",
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses((status = 200, description = "Current preferences", body = PreferencesPayload))
)]
pub async fn get_preferences_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let prefs = app_state
        .quiz
        .learning_preferences(user_id)
        .await
        .map_err(|e| to_http(e, "Failed to load learning preferences"))?;
    Ok(Json(PreferencesPayload::from(prefs)))
}

#[utoipa::path(
    put,
    path = "/preferences/learning",
    request_body = PreferencesPayload,
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses(
        (status = 200, description = "Preferences updated", body = PreferencesPayload),
        (status = 400, description = "A value is out of range")
    )
)]
pub async fn update_preferences_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<PreferencesPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let updated = app_state
        .quiz
        .update_learning_preferences(payload.into_domain(user_id))
        .await
        .map_err(|e| to_http(e, "Failed to update learning preferences"))?;
    Ok(Json(PreferencesPayload::from(updated)))
}

/// Change language, level or timezone.
#[utoipa::path(
    put,
    path = "/settings",
    request_body = SettingsRequest,
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses(
        (status = 200, description = "Profile updated", body = UserView),
        (status = 400, description = "Unknown level or timezone")
    )
)]
pub async fn update_settings_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<SettingsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let current_level = req
        .current_level
        .as_deref()
        .map(str::parse::<CefrLevel>)
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let settings = UserSettings {
        preferred_language: req.preferred_language,
        current_level,
        timezone: req.timezone,
    };
    let user = app_state
        .quiz
        .update_settings(user_id, settings)
        .await
        .map_err(|e| to_http(e, "Failed to update settings"))?;
    Ok(Json(UserView::from(user)))
}
