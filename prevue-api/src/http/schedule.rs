//! Schedule read endpoints

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use prevue_core::service::clock;

use super::{AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    /// Window size in hours from the current block start (default 24).
    pub hours: Option<i64>,
}

/// Current schedule window for every channel.
pub async fn all(
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let from = clock::block_start(now, state.config.schedule.day_start_hour);
    let to = from + Duration::hours(query.hours.unwrap_or(24));

    let channels = state.channels.list().await?;
    let blocks = state.blocks.all_in_range(from, to).await?;

    let lineup: Vec<_> = channels
        .iter()
        .map(|channel| {
            let channel_blocks: Vec<_> = blocks
                .iter()
                .filter(|b| b.channel_number == channel.number)
                .collect();
            json!({
                "channel": channel,
                "blocks": channel_blocks,
            })
        })
        .collect();

    Ok(Json(json!({ "from": from, "to": to, "channels": lineup })))
}

/// Schedule window for one channel.
pub async fn for_channel(
    State(state): State<AppState>,
    Path(channel): Path<i64>,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let from = clock::block_start(now, state.config.schedule.day_start_hour);
    let to = from + Duration::hours(query.hours.unwrap_or(24));

    let channel = state.channels.get(channel).await?;
    let blocks = state.blocks.for_channel_in_range(channel.number, from, to).await?;
    Ok(Json(json!({ "channel": channel, "blocks": blocks })))
}

/// What's airing right now on one channel.
pub async fn now_playing(
    State(state): State<AppState>,
    Path(channel): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let result = state.tuner.current_program(channel, Utc::now()).await?;
    Ok(Json(result))
}

/// Wipe and rebuild all schedules.
pub async fn regenerate(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let generated = state.scheduler.regenerate_all(Utc::now()).await?;
    state.scheduler.clean_old_blocks(Utc::now()).await?;
    Ok(Json(json!({ "blocks_generated": generated })))
}
