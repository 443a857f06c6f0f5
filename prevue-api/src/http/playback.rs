//! Tuning endpoint: join a channel mid-stream

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use prevue_core::models::ScheduleProgram;
use prevue_core::service::clock;

use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct TuneQuery {
    pub bitrate: Option<i64>,
    #[serde(rename = "maxWidth")]
    pub max_width: Option<i64>,
    #[serde(rename = "audioStreamIndex")]
    pub audio_stream_index: Option<i32>,
}

/// Resolve (channel, now) to the airing program and a master playlist URL
/// that joins it at the right offset.
pub async fn tune(
    State(state): State<AppState>,
    Path(channel): Path<i64>,
    Query(query): Query<TuneQuery>,
) -> AppResult<impl IntoResponse> {
    let result = state.tuner.current_program(channel, Utc::now()).await?;

    let ScheduleProgram::Program(ref program) = result.program else {
        return Err(AppError::not_found(
            "An interstitial is airing; try again shortly",
        ));
    };

    let mut stream_url = format!(
        "/api/stream/{}?startTicks={}&channel={}",
        program.item_id,
        clock::ms_to_ticks(result.seek_ms),
        channel,
    );
    if let Some(bitrate) = query.bitrate {
        stream_url.push_str(&format!("&bitrate={bitrate}"));
    }
    if let Some(width) = query.max_width {
        stream_url.push_str(&format!("&maxWidth={width}"));
    }
    if let Some(idx) = query.audio_stream_index {
        stream_url.push_str(&format!("&audioStreamIndex={idx}"));
    }

    Ok(Json(json!({
        "channel": result.channel_number,
        "program": result.program,
        "next": result.next,
        "seek_ms": result.seek_ms,
        "stream_url": stream_url,
    })))
}
