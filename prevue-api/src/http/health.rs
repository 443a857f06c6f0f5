//! Liveness and auth-status endpoints (always public)

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use super::AppState;

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Whether an API key gate is configured, so setup UIs know to prompt.
pub async fn auth_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "auth_required": state.config.auth.api_key.is_some() }))
}
