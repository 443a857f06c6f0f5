//! IPTV surface: M3U playlist and XMLTV guide
//!
//! Thin serializers over the channel lineup and schedule so generic IPTV
//! players can tune Prevue channels. Gated by the `iptv_enabled` setting.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use prevue_core::service::clock;
use prevue_core::models::ScheduleProgram;

use super::{AppError, AppResult, AppState};

const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S +0000";

#[derive(Debug, Deserialize)]
pub struct EpgQuery {
    /// Guide window in hours (default 12, capped at 48).
    pub hours: Option<i64>,
}

async fn ensure_enabled(state: &AppState) -> AppResult<()> {
    if state.settings.iptv_enabled().await? {
        Ok(())
    } else {
        Err(AppError::forbidden("IPTV output is disabled"))
    }
}

/// External base URL as the client sees it, honoring reverse proxies.
fn request_base_url(headers: &HeaderMap, state: &AppState) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map_or_else(
            || format!("localhost:{}", state.config.server.port),
            ToString::to_string,
        );
    format!("{proto}://{host}")
}

/// `GET /api/iptv/playlist.m3u`
pub async fn playlist(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Response> {
    ensure_enabled(&state).await?;
    let base = request_base_url(&headers, &state);
    let channels = state.channels.list().await?;

    let mut out = format!("#EXTM3U url-tvg=\"{base}/api/iptv/epg.xml\"\n");
    for channel in &channels {
        let n = channel.number;
        let name = &channel.name;
        out.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"ch-{n}\" tvg-name=\"{name}\" tvg-chno=\"{n}\" tvg-logo=\"\" group-title=\"Prevue\",{name}\n{base}/api/iptv/channel/{n}\n",
        ));
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/x-mpegurl")],
        out,
    )
        .into_response())
}

/// `GET /api/iptv/epg.xml` — XMLTV guide, cached for five minutes per
/// (channel count, window, base URL).
pub async fn epg(
    State(state): State<AppState>,
    Query(query): Query<EpgQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    ensure_enabled(&state).await?;
    let hours = query.hours.unwrap_or(12).clamp(1, 48);
    let base = request_base_url(&headers, &state);

    let channels = state.channels.list().await?;
    let cache_key = (channels.len(), hours, base.clone());
    let xml = match state.epg_cache.get(&cache_key) {
        Some(cached) => cached,
        None => {
            let now = Utc::now();
            let from = clock::block_start(now, state.config.schedule.day_start_hour);
            let to = now + Duration::hours(hours);
            let blocks = state.blocks.all_in_range(from, to).await?;

            let mut xml = String::with_capacity(16 * 1024);
            xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
            xml.push_str("<tv generator-info-name=\"prevue\">\n");
            for channel in &channels {
                xml.push_str(&format!(
                    "  <channel id=\"ch-{}\">\n    <display-name>{}</display-name>\n  </channel>\n",
                    channel.number,
                    escape_xml(&channel.name),
                ));
            }
            for block in &blocks {
                for program in &block.programs {
                    if program.end_time() <= now || program.start_time() >= to {
                        continue;
                    }
                    xml.push_str(&programme_xml(block.channel_number, program));
                }
            }
            xml.push_str("</tv>\n");
            state.epg_cache.insert(cache_key, xml.clone());
            xml
        }
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        xml,
    )
        .into_response())
}

fn programme_xml(channel_number: i64, program: &ScheduleProgram) -> String {
    let start = format_xmltv(program.start_time());
    let stop = format_xmltv(program.end_time());
    let mut out = format!(
        "  <programme start=\"{start}\" stop=\"{stop}\" channel=\"ch-{channel_number}\">\n    <title>{}</title>\n",
        escape_xml(program.title()),
    );
    if let ScheduleProgram::Program(p) = program {
        if let Some(subtitle) = &p.subtitle {
            out.push_str(&format!("    <sub-title>{}</sub-title>\n", escape_xml(subtitle)));
        }
        if let Some(year) = p.year {
            out.push_str(&format!("    <date>{year}</date>\n"));
        }
        if let Some(rating) = &p.rating {
            out.push_str(&format!(
                "    <rating><value>{}</value></rating>\n",
                escape_xml(rating),
            ));
        }
    }
    out.push_str("  </programme>\n");
    out
}

fn format_xmltv(t: DateTime<Utc>) -> String {
    t.format(XMLTV_TIME_FORMAT).to_string()
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// `GET /api/iptv/channel/{n}` — resolve the airing program and redirect
/// the player into it. 503 with Retry-After when nothing real is airing.
pub async fn channel(
    State(state): State<AppState>,
    Path(number): Path<i64>,
) -> AppResult<Response> {
    ensure_enabled(&state).await?;
    let now = Utc::now();

    let result = match state.tuner.current_program(number, now).await {
        Ok(result) => result,
        Err(prevue_core::Error::NotFound(_)) => {
            return Err(AppError::unavailable_retry_after(
                "Nothing is airing on this channel",
                60,
            ));
        }
        Err(e) => return Err(e.into()),
    };

    match &result.program {
        ScheduleProgram::Program(program) => {
            let url = format!(
                "/api/stream/{}?startTicks={}&channel={}",
                program.item_id,
                clock::ms_to_ticks(result.seek_ms),
                number,
            );
            Ok(Redirect::temporary(&url).into_response())
        }
        ScheduleProgram::Interstitial(entry) => {
            let wait = (entry.end_time - now).num_seconds().max(1) as u64;
            Err(AppError::unavailable_retry_after(
                "An interstitial is airing",
                wait,
            ))
        }
    }
}
