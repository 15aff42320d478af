use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use super::{AppState, Caller, json_error};

/// Most session records returned by one admin listing.
pub const ADMIN_SESSION_LIMIT: usize = 200;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Recent terminal sessions across all users, newest first.
pub async fn list_sessions(Caller(caller): Caller, State(state): State<AppState>) -> Response {
    if !caller.is_admin {
        tracing::debug!(user_id = %caller.user_id, "Admin listing refused");
        return StatusCode::FORBIDDEN.into_response();
    }

    match state
        .proxy
        .store
        .list_session_records(ADMIN_SESSION_LIMIT)
        .await
    {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => {
            tracing::error!("Failed to list sessions: {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list sessions")
        }
    }
}
