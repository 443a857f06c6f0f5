//! HLS stream endpoints: master playlist, proxy, session lifecycle
//!
//! Every playback request flows through here. The master endpoint opens an
//! Upstream transcode session and hands the client a rewritten playlist;
//! the proxy endpoint forwards child playlists and segments, coalescing
//! identical in-flight fetches; stop/progress manage session lifecycle.

use axum::{
    body::Body,
    extract::{Path, Query, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use prevue_core::service::clock;
use prevue_proxy::{fetch_upstream, rewrite_playlist, ProxiedResponse, RewriteParams};
use prevue_upstream::{StreamQuality, UpstreamClient};

use super::{AppError, AppResult, AppState};

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Deserialize)]
pub struct MasterQuery {
    pub bitrate: Option<i64>,
    #[serde(rename = "maxWidth")]
    pub max_width: Option<i64>,
    #[serde(rename = "audioStreamIndex")]
    pub audio_stream_index: Option<i32>,
    #[serde(rename = "startTicks")]
    pub start_ticks: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    pub item_id: String,
    pub play_session_id: Option<String>,
    pub final_position_ms: Option<i64>,
    pub channel: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub item_id: String,
    pub position_ms: i64,
    pub channel: Option<i64>,
}

/// Open (or reuse) a transcode session and return the rewritten master
/// playlist.
pub async fn master(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(query): Query<MasterQuery>,
) -> AppResult<Response> {
    let (_, client) = state.upstream().await?;

    let quality = match query.bitrate.or(state.settings.stream_quality().await?) {
        Some(video_bps) => StreamQuality::Bitrate { video_bps, max_width: query.max_width },
        None => StreamQuality::Auto,
    };

    let session = client
        .get_hls_stream_url(&item_id, query.start_ticks, quality, query.audio_stream_index)
        .await?;
    state
        .sessions
        .track(&item_id, &session.play_session_id, &session.media_source_id);

    {
        let client = client.clone();
        let item_id = item_id.clone();
        let play_session_id = session.play_session_id.clone();
        tokio::spawn(async move {
            let _ = client.report_playback_start(&item_id, &play_session_id).await;
        });
    }

    let fetched = fetch_upstream(&state.stream_client, &session.url)
        .await
        .map_err(AppError::internal)?;
    if fetched.status >= 500 {
        cleanup_session(&state, &client, &item_id, &session.play_session_id);
        return Err(AppError::bad_gateway("Upstream media server error"));
    }
    if fetched.status >= 400 {
        return Ok(forward(fetched));
    }

    let playlist = String::from_utf8_lossy(&fetched.body);
    let rewritten = rewrite_playlist(
        &playlist,
        &RewriteParams {
            play_session_id: &session.play_session_id,
            device_id: UpstreamClient::device_id(),
        },
    );

    Ok(playlist_response(rewritten))
}

/// Forward a child playlist or segment, coalescing identical in-flight
/// requests into one Upstream fetch.
pub async fn proxy(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> AppResult<Response> {
    let (server, client) = state.upstream().await?;
    let upstream_url = match query.as_deref() {
        Some(q) if !q.is_empty() => format!("{}/{}?{}", server.base_url, path, q),
        _ => format!("{}/{}", server.base_url, path),
    };

    let response = state
        .coalescer
        .fetch(
            upstream_url.clone(),
            fetch_upstream(&state.stream_client, &upstream_url),
        )
        .await
        .map_err(AppError::internal)?;

    let item_id = item_id_from_path(&path);

    if response.status >= 500 {
        // A transcoder fault poisons the session: tear it down so the next
        // request starts a fresh one, then surface the failure.
        let play_session_id = query
            .as_deref()
            .and_then(|q| query_param(q, "PlaySessionId"))
            .or_else(|| {
                item_id
                    .as_deref()
                    .and_then(|id| state.sessions.get(id))
                    .map(|s| s.play_session_id)
            });
        if let Some(id) = item_id.as_deref() {
            state.sessions.drop_session(id);
        }
        if let Some(play_session_id) = play_session_id {
            let client = client.clone();
            tokio::spawn(async move {
                let _ = client.stop_playback_session(&play_session_id, None).await;
                let _ = client.delete_transcoding_job(&play_session_id).await;
            });
        }
        return Err(AppError::bad_gateway("Upstream transcoder error"));
    }

    if let Some(id) = item_id.as_deref() {
        state.sessions.touch(id);
    }

    if response.status >= 400 {
        return Ok(forward(response));
    }

    if response.is_playlist(&upstream_url) {
        let play_session_id = query
            .as_deref()
            .and_then(|q| query_param(q, "PlaySessionId"))
            .or_else(|| {
                item_id
                    .as_deref()
                    .and_then(|id| state.sessions.get(id))
                    .map(|s| s.play_session_id)
            })
            .unwrap_or_default();
        let playlist = String::from_utf8_lossy(&response.body);
        let rewritten = rewrite_playlist(
            &playlist,
            &RewriteParams {
                play_session_id: &play_session_id,
                device_id: UpstreamClient::device_id(),
            },
        );
        return Ok(playlist_response(rewritten));
    }

    Ok(forward(response))
}

/// Explicitly end a playback session.
pub async fn stop(
    State(state): State<AppState>,
    Json(request): Json<StopRequest>,
) -> AppResult<impl IntoResponse> {
    let entry = state.sessions.drop_session(&request.item_id);
    let play_session_id = request
        .play_session_id
        .or(entry.map(|e| e.play_session_id));

    if let Some(position_ms) = request.final_position_ms {
        state
            .watch_metrics
            .record_progress(request.channel, &request.item_id, position_ms)
            .await?;
    }

    if let Some(play_session_id) = play_session_id {
        if let Ok((_, client)) = state.upstream().await {
            let position_ticks = request.final_position_ms.map(clock::ms_to_ticks);
            tokio::spawn(async move {
                let _ = client
                    .stop_playback_session(&play_session_id, position_ticks)
                    .await;
                let _ = client.delete_transcoding_job(&play_session_id).await;
            });
        }
    }

    Ok(Json(json!({ "ok": true })))
}

/// Periodic progress report from the player.
pub async fn progress(
    State(state): State<AppState>,
    Json(request): Json<ProgressRequest>,
) -> AppResult<impl IntoResponse> {
    state.sessions.touch(&request.item_id);
    state
        .watch_metrics
        .record_progress(request.channel, &request.item_id, request.position_ms)
        .await?;

    if let Some(session) = state.sessions.get(&request.item_id) {
        if let Ok((_, client)) = state.upstream().await {
            let item_id = request.item_id.clone();
            let position_ticks = clock::ms_to_ticks(request.position_ms);
            tokio::spawn(async move {
                let _ = client
                    .report_playback_progress(&item_id, &session.play_session_id, position_ticks)
                    .await;
            });
        }
    }

    Ok(Json(json!({ "ok": true })))
}

/// Best-effort teardown after a transcoder fault.
fn cleanup_session(state: &AppState, client: &UpstreamClient, item_id: &str, play_session_id: &str) {
    state.sessions.drop_session(item_id);
    let client = client.clone();
    let play_session_id = play_session_id.to_string();
    tokio::spawn(async move {
        let _ = client.stop_playback_session(&play_session_id, None).await;
        let _ = client.delete_transcoding_job(&play_session_id).await;
    });
}

/// Item id embedded in Upstream video paths (`Videos/{id}/...`).
fn item_id_from_path(path: &str) -> Option<String> {
    let mut segments = path.split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("videos") {
            return segments.next().map(ToString::to_string);
        }
    }
    None
}

fn query_param(query: &str, wanted: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        key.eq_ignore_ascii_case(wanted).then(|| value.to_string())
    })
}

fn playlist_response(body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn forward(response: ProxiedResponse) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY));
    if let Some(content_type) = &response.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder = builder.header(header::CACHE_CONTROL, "no-cache");
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_extraction_from_proxy_paths() {
        assert_eq!(
            item_id_from_path("Videos/abc123/hls1/main/0.ts").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            item_id_from_path("videos/xyz/master.m3u8").as_deref(),
            Some("xyz")
        );
        assert_eq!(item_id_from_path("Audio/abc/stream"), None);
        assert_eq!(item_id_from_path(""), None);
    }

    #[test]
    fn query_param_lookup_is_case_insensitive() {
        let q = "MediaSourceId=m&playSessionId=ps9&x=1";
        assert_eq!(query_param(q, "PlaySessionId").as_deref(), Some("ps9"));
        assert_eq!(query_param(q, "missing"), None);
    }
}
