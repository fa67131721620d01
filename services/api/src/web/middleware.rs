//! services/api/src/web/middleware.rs
//!
//! Identifies the caller of every quiz route.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::web::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that reads the trusted `x-user-id` header and makes sure the user row
/// exists.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// A missing header is 401, a malformed one 400.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    // 1. Extract the header
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                format!("{} header is required", USER_ID_HEADER),
            )
        })?;

    // 2. Parse it
    let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid {} format", USER_ID_HEADER),
        )
    })?;

    // 3. Create the user lazily
    state.store.get_or_create_user(user_id).await.map_err(|e| {
        error!("Failed to load user {}: {:?}", user_id, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load user".to_string(),
        )
    })?;

    // 4. Insert user_id into request extensions
    req.extensions_mut().insert(user_id);

    // 5. Continue to the handler
    Ok(next.run(req).await)
}
