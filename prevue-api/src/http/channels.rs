//! Channel CRUD and lineup regeneration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use prevue_core::models::{ChannelFilter, ChannelKind, LibraryItem};

use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub item_ids: Vec<String>,
    pub filter: Option<ChannelFilter>,
    pub ai_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChannelRequest {
    pub name: Option<String>,
    pub item_ids: Option<Vec<String>>,
    pub filter: Option<Option<ChannelFilter>>,
    pub sort_order: Option<i64>,
    pub ai_prompt: Option<Option<String>>,
}

pub async fn list(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.channels.list().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(number): Path<i64>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.channels.get(number).await?))
}

/// Create a custom channel. With a filter and no explicit items, the item
/// set is resolved from the current library snapshot.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateChannelRequest>,
) -> AppResult<impl IntoResponse> {
    if request.name.trim().is_empty() {
        return Err(AppError::bad_request("Channel name is required"));
    }

    let item_ids = if request.item_ids.is_empty() {
        match &request.filter {
            Some(filter) => {
                let now = Utc::now();
                state
                    .library
                    .current()
                    .items()
                    .filter(|item| filter.matches(item, now))
                    .map(|item| item.id.clone())
                    .collect()
            }
            None => {
                return Err(AppError::bad_request(
                    "Either item_ids or a filter is required",
                ))
            }
        }
    } else {
        request.item_ids
    };

    let channel = state
        .channels
        .insert(&prevue_core::repository::ChannelDraft {
            name: request.name.trim().to_string(),
            kind: ChannelKind::Custom,
            preset_id: None,
            filter: request.filter,
            item_ids,
            sort_order: 0,
            ai_prompt: request.ai_prompt,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(number): Path<i64>,
    Json(request): Json<UpdateChannelRequest>,
) -> AppResult<impl IntoResponse> {
    let channel = state
        .channels
        .update(
            number,
            &prevue_core::repository::ChannelUpdate {
                name: request.name,
                filter: request.filter,
                item_ids: request.item_ids,
                sort_order: request.sort_order,
                ai_prompt: request.ai_prompt,
            },
        )
        .await?;
    Ok(Json(channel))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(number): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.channels.delete(number).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rebuild one channel's schedule in place.
pub async fn regenerate(
    State(state): State<AppState>,
    Path(number): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let generated = state.scheduler.regenerate_channel(number, Utc::now()).await?;
    Ok(Json(json!({ "blocks_generated": generated })))
}

/// Rebuild the whole lineup from the selected presets, then regenerate
/// every schedule.
pub async fn regenerate_lineup(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let (collections, playlists) = fetch_containers_if_needed(&state).await?;
    let created = state
        .lineup
        .rebuild(ChannelKind::Preset, &collections, &playlists)
        .await?;
    let blocks = state.scheduler.regenerate_all(Utc::now()).await?;
    Ok(Json(json!({
        "channels": created.len(),
        "blocks_generated": blocks,
    })))
}

/// Fetch Upstream collections/playlists only when the selected presets
/// actually use them. Without an active server those presets just yield
/// nothing.
pub(crate) async fn fetch_containers_if_needed(
    state: &AppState,
) -> AppResult<(
    Vec<(String, Vec<LibraryItem>)>,
    Vec<(String, Vec<LibraryItem>)>,
)> {
    let (wants_collections, wants_playlists) = state.lineup.wants_containers().await?;
    if !wants_collections && !wants_playlists {
        return Ok((Vec::new(), Vec::new()));
    }
    let Ok((_, client)) = state.upstream().await else {
        return Ok((Vec::new(), Vec::new()));
    };

    let mut collections = Vec::new();
    if wants_collections {
        for (container, items) in client.get_collections().await? {
            collections.push((
                container.name,
                items.into_iter().map(LibraryItem::from).collect(),
            ));
        }
    }
    let mut playlists = Vec::new();
    if wants_playlists {
        for (container, items) in client.get_playlists().await? {
            playlists.push((
                container.name,
                items.into_iter().map(LibraryItem::from).collect(),
            ));
        }
    }
    Ok((collections, playlists))
}
