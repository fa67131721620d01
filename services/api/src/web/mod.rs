pub mod daily;
pub mod insights;
pub mod middleware;
pub mod rest;
pub mod settings;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::require_user;
pub use state::AppState;

/// Every quiz route, behind the user middleware.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Interactive flow
        .route("/quiz/next", get(rest::next_question_handler))
        .route("/quiz/answer", post(rest::submit_answer_handler))
        .route("/quiz/questions/{id}/known", post(rest::mark_known_handler))
        .route("/quiz/questions/{id}/report", post(rest::report_question_handler))
        .route("/questions", post(rest::create_question_handler))
        .route("/quiz/progress", get(insights::progress_handler))
        .route("/quiz/priority-insights", get(insights::priority_insights_handler))
        // Preferences and profile
        .route(
            "/preferences/learning",
            get(settings::get_preferences_handler).put(settings::update_preferences_handler),
        )
        .route("/settings", put(settings::update_settings_handler))
        // Daily assignments
        .route("/daily/today", get(daily::today_handler))
        .route("/daily/dates", get(daily::dates_handler))
        .route("/daily/history/{question_id}", get(daily::history_handler))
        .route("/daily/{date}", get(daily::daily_questions_handler))
        .route("/daily/{date}/progress", get(daily::progress_handler))
        .route("/daily/{date}/regenerate", post(daily::regenerate_handler))
        .route(
            "/daily/{date}/questions/{question_id}/answer",
            post(daily::daily_answer_handler),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_user))
        .with_state(state)
}
