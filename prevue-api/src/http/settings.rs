//! Settings endpoints

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value as JsonValue};

use super::{AppResult, AppState};

/// All persisted settings as one object.
pub async fn list(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let pairs = state.settings.all().await?;
    let mut object = Map::new();
    for (key, value) in pairs {
        object.insert(key, value);
    }
    Ok(Json(JsonValue::Object(object)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let value = state.settings.get(&key).await?;
    Ok(Json(json!({ "key": key, "value": value })))
}

/// Set one setting. Unknown keys and malformed values are rejected.
pub async fn update(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<JsonValue>,
) -> AppResult<impl IntoResponse> {
    state.settings.set(&key, &value).await?;
    Ok(Json(json!({ "key": key, "value": value })))
}

/// Wipe all persistent state and the in-memory caches.
pub async fn factory_reset(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    prevue_core::repository::factory_reset(&state.pool).await?;
    state.library.swap(prevue_core::service::LibrarySnapshot::default());
    for (item_id, _) in state.sessions.all() {
        state.sessions.drop_session(&item_id);
    }
    Ok(Json(json!({ "ok": true })))
}
