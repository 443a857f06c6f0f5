//! Upstream HTTP client

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::json;

use crate::error::{check_response, json_with_limit, UpstreamError};
use crate::types::{
    default_device_profile, AuthResponse, Item, ItemsResponse, PlaybackInfoResponse, SystemInfo,
};

/// Page size for the paginated sync fallback.
const SYNC_PAGE_SIZE: i64 = 1000;

/// Field projection requested during library sync.
const SYNC_FIELDS: &str = "Genres,Overview,Studios,DateCreated,Tags,People";

const X_EMBY_TOKEN: &str = "X-Emby-Token";

/// Shared HTTP client for all Upstream requests (connection pooling).
/// Redirects are disabled to prevent SSRF via redirect to private IPs.
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build shared Upstream HTTP client")
});

/// Stable per-process device identity reported to Upstream.
static DEVICE_ID: LazyLock<String> =
    LazyLock::new(|| format!("prevue-{}", uuid::Uuid::new_v4().simple()));

/// Requested transcode quality for an HLS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamQuality {
    /// No explicit bitrate: let Upstream stream-copy when it can.
    Auto,
    /// Explicit video bitrate in bits/s, with an optional width clamp.
    Bitrate { video_bps: i64, max_width: Option<i64> },
}

/// A live transcode/playback session handed out by Upstream.
#[derive(Debug, Clone)]
pub struct StreamSession {
    /// Fully-qualified Upstream master playlist URL (carries the api_key).
    pub url: String,
    pub play_session_id: String,
    pub media_source_id: String,
    pub is_hdr_source: bool,
}

/// Jellyfin-compatible Upstream client.
#[derive(Clone)]
pub struct UpstreamClient {
    base_url: String,
    token: Option<String>,
    user_id: Option<String>,
    client: Client,
}

impl UpstreamClient {
    /// Create an unauthenticated client (reuses the shared connection pool).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base_url(base_url.into()),
            token: None,
            user_id: None,
            client: SHARED_CLIENT.clone(),
        }
    }

    /// Create a client with stored credentials.
    pub fn with_credentials(
        base_url: impl Into<String>,
        token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: trim_base_url(base_url.into()),
            token: Some(token.into()),
            user_id: Some(user_id.into()),
            client: SHARED_CLIENT.clone(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn device_id() -> &'static str {
        &DEVICE_ID
    }

    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.token.is_some() && self.user_id.is_some()
    }

    fn user_id(&self) -> Result<&str, UpstreamError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| UpstreamError::InvalidConfig("Missing user_id".to_string()))
    }

    fn token(&self) -> Result<&str, UpstreamError> {
        self.token
            .as_deref()
            .ok_or_else(|| UpstreamError::InvalidConfig("Missing access token".to_string()))
    }

    fn build_headers(&self) -> Result<HeaderMap, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Emby-Authorization",
            HeaderValue::from_str(&format!(
                "MediaBrowser Client=\"Prevue\", Device=\"Prevue Server\", DeviceId=\"{}\", Version=\"{}\"",
                *DEVICE_ID,
                env!("CARGO_PKG_VERSION"),
            ))?,
        );
        if let Some(ref token) = self.token {
            headers.insert(X_EMBY_TOKEN, HeaderValue::from_str(token)?);
        }
        Ok(headers)
    }

    /// Authenticate by username/password and store the resulting credentials.
    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(String, String), UpstreamError> {
        let url = format!("{}/Users/AuthenticateByName", self.base_url);
        let body = json!({ "Username": username, "Pw": password });

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Api(format!(
                "Login failed: {}",
                response.status()
            )));
        }

        let auth: AuthResponse = json_with_limit(response).await?;
        self.token = Some(auth.access_token.clone());
        self.user_id = Some(auth.user.id.clone());
        Ok((auth.access_token, auth.user.id))
    }

    /// Probe the server. Works with or without credentials.
    pub async fn test_connection(&self) -> Result<SystemInfo, UpstreamError> {
        let url = format!("{}/System/Info/Public", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;
        let response = check_response(response)?;
        json_with_limit(response).await
    }

    /// Fetch every movie and episode with the standard sync projection.
    ///
    /// One-shot full fetch first; if that fails (some servers reject
    /// unbounded listings), falls back to pages of [`SYNC_PAGE_SIZE`].
    /// `progress` receives (fetched_so_far, total_if_known) per page.
    pub async fn fetch_all_items(
        &self,
        mut progress: Option<&mut (dyn FnMut(usize, Option<i64>) + Send)>,
    ) -> Result<Vec<Item>, UpstreamError> {
        match self.fetch_items_page(None).await {
            Ok(resp) => {
                if let Some(cb) = progress.as_deref_mut() {
                    cb(resp.items.len(), Some(resp.total_record_count));
                }
                Ok(resp.items)
            }
            Err(UpstreamError::AuthExpired) => Err(UpstreamError::AuthExpired),
            Err(err) => {
                tracing::warn!(error = %err, "Full library fetch failed, falling back to pagination");
                self.fetch_items_paginated(progress).await
            }
        }
    }

    async fn fetch_items_paginated(
        &self,
        mut progress: Option<&mut (dyn FnMut(usize, Option<i64>) + Send)>,
    ) -> Result<Vec<Item>, UpstreamError> {
        let mut items = Vec::new();
        let mut start_index = 0_i64;
        loop {
            let page = self.fetch_items_page(Some(start_index)).await?;
            let fetched = page.items.len();
            items.extend(page.items);
            if let Some(cb) = progress.as_deref_mut() {
                cb(items.len(), Some(page.total_record_count));
            }
            if fetched < SYNC_PAGE_SIZE as usize || items.len() as i64 >= page.total_record_count {
                break;
            }
            start_index += SYNC_PAGE_SIZE;
        }
        Ok(items)
    }

    async fn fetch_items_page(
        &self,
        start_index: Option<i64>,
    ) -> Result<ItemsResponse, UpstreamError> {
        let user_id = self.user_id()?;
        let mut url = format!(
            "{}/Users/{}/Items?Recursive=true&IncludeItemTypes=Movie,Episode&Fields={}&EnableUserData=true",
            self.base_url,
            url_encode(user_id),
            SYNC_FIELDS,
        );
        if let Some(start) = start_index {
            url.push_str(&format!("&StartIndex={start}&Limit={SYNC_PAGE_SIZE}"));
        }

        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;
        let response = check_response(response)?;
        json_with_limit(response).await
    }

    /// Fetch a single item by id.
    pub async fn get_item(&self, item_id: &str) -> Result<Item, UpstreamError> {
        let user_id = self.user_id()?;
        let url = format!(
            "{}/Users/{}/Items?Ids={}&Fields={}",
            self.base_url,
            url_encode(user_id),
            url_encode(item_id),
            SYNC_FIELDS,
        );

        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;
        let response = check_response(response)?;
        let resp: ItemsResponse = json_with_limit(response).await?;
        resp.items
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::Api(format!("Item not found: {item_id}")))
    }

    /// List collections (box sets) with their member items.
    pub async fn get_collections(&self) -> Result<Vec<(Item, Vec<Item>)>, UpstreamError> {
        self.get_containers("BoxSet").await
    }

    /// List playlists with their member items.
    pub async fn get_playlists(&self) -> Result<Vec<(Item, Vec<Item>)>, UpstreamError> {
        self.get_containers("Playlist").await
    }

    async fn get_containers(
        &self,
        container_type: &str,
    ) -> Result<Vec<(Item, Vec<Item>)>, UpstreamError> {
        let user_id = self.user_id()?;
        let url = format!(
            "{}/Users/{}/Items?Recursive=true&IncludeItemTypes={}",
            self.base_url,
            url_encode(user_id),
            container_type,
        );
        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;
        let response = check_response(response)?;
        let containers: ItemsResponse = json_with_limit(response).await?;

        let mut result = Vec::with_capacity(containers.items.len());
        for container in containers.items {
            let children = self.get_children(&container.id).await?;
            result.push((container, children));
        }
        Ok(result)
    }

    async fn get_children(&self, parent_id: &str) -> Result<Vec<Item>, UpstreamError> {
        let user_id = self.user_id()?;
        let url = format!(
            "{}/Users/{}/Items?ParentId={}&IncludeItemTypes=Movie,Episode&Recursive=true&Fields={}",
            self.base_url,
            url_encode(user_id),
            url_encode(parent_id),
            SYNC_FIELDS,
        );
        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;
        let response = check_response(response)?;
        let resp: ItemsResponse = json_with_limit(response).await?;
        Ok(resp.items)
    }

    /// Ask Upstream for playback info (play session + media sources).
    pub async fn get_playback_info(
        &self,
        item_id: &str,
        audio_stream_index: Option<i32>,
        max_streaming_bitrate: Option<i64>,
    ) -> Result<PlaybackInfoResponse, UpstreamError> {
        let user_id = self.user_id()?;
        let url = format!(
            "{}/Items/{}/PlaybackInfo",
            self.base_url,
            url_encode(item_id)
        );

        let mut body = json!({
            "UserId": user_id,
            "DeviceProfile": default_device_profile(),
            "AutoOpenLiveStream": true,
            "IsPlayback": true,
        });
        if let Some(idx) = audio_stream_index {
            body["AudioStreamIndex"] = json!(idx);
        }
        if let Some(bitrate) = max_streaming_bitrate {
            body["MaxStreamingBitrate"] = json!(bitrate);
        }

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await?;
        let response = check_response(response)?;
        json_with_limit(response).await
    }

    /// Acquire a playback session and build the master playlist URL for it.
    pub async fn get_hls_stream_url(
        &self,
        item_id: &str,
        start_ticks: Option<i64>,
        quality: StreamQuality,
        audio_stream_index: Option<i32>,
    ) -> Result<StreamSession, UpstreamError> {
        let max_bitrate = match quality {
            StreamQuality::Bitrate { video_bps, .. } => Some(video_bps),
            StreamQuality::Auto => None,
        };
        let info = self
            .get_playback_info(item_id, audio_stream_index, max_bitrate)
            .await?;
        let source = info
            .media_sources
            .first()
            .ok_or_else(|| UpstreamError::Api(format!("No media sources for item {item_id}")))?;

        let url = build_master_url(
            &self.base_url,
            item_id,
            &source.id,
            &info.play_session_id,
            self.token()?,
            start_ticks,
            quality,
            audio_stream_index,
        );

        Ok(StreamSession {
            url,
            play_session_id: info.play_session_id,
            media_source_id: source.id.clone(),
            is_hdr_source: source.is_hdr(),
        })
    }

    /// Tell Upstream playback stopped. Best-effort: failures are logged.
    pub async fn stop_playback_session(
        &self,
        play_session_id: &str,
        position_ticks: Option<i64>,
    ) -> Result<(), UpstreamError> {
        let url = format!("{}/Sessions/Playing/Stopped", self.base_url);
        let mut body = json!({ "PlaySessionId": play_session_id });
        if let Some(pos) = position_ticks {
            body["PositionTicks"] = json!(pos);
        }
        let resp = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), play_session_id, "Upstream stop report failed");
        }
        Ok(())
    }

    /// Delete the active transcode job for a play session.
    pub async fn delete_transcoding_job(
        &self,
        play_session_id: &str,
    ) -> Result<(), UpstreamError> {
        let url = format!(
            "{}/Videos/ActiveEncodings?DeviceId={}&PlaySessionId={}",
            self.base_url,
            url_encode(&DEVICE_ID),
            url_encode(play_session_id),
        );
        let resp = self
            .client
            .delete(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), play_session_id, "Upstream transcode delete failed");
        }
        Ok(())
    }

    /// Report playback started.
    pub async fn report_playback_start(
        &self,
        item_id: &str,
        play_session_id: &str,
    ) -> Result<(), UpstreamError> {
        self.report_playing("", item_id, play_session_id, None).await
    }

    /// Report playback progress at a position.
    pub async fn report_playback_progress(
        &self,
        item_id: &str,
        play_session_id: &str,
        position_ticks: i64,
    ) -> Result<(), UpstreamError> {
        self.report_playing("/Progress", item_id, play_session_id, Some(position_ticks))
            .await
    }

    async fn report_playing(
        &self,
        suffix: &str,
        item_id: &str,
        play_session_id: &str,
        position_ticks: Option<i64>,
    ) -> Result<(), UpstreamError> {
        let url = format!("{}/Sessions/Playing{}", self.base_url, suffix);
        let mut body = json!({
            "ItemId": item_id,
            "PlaySessionId": play_session_id,
            "PlayMethod": "Transcode",
        });
        if let Some(pos) = position_ticks {
            body["PositionTicks"] = json!(pos);
        }
        let resp = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), item_id, "Upstream playback report failed");
        }
        Ok(())
    }
}

/// Build the Upstream master playlist URL for a transcode session.
#[allow(clippy::too_many_arguments)]
fn build_master_url(
    base_url: &str,
    item_id: &str,
    media_source_id: &str,
    play_session_id: &str,
    token: &str,
    start_ticks: Option<i64>,
    quality: StreamQuality,
    audio_stream_index: Option<i32>,
) -> String {
    let mut url = format!(
        "{}/Videos/{}/master.m3u8?DeviceId={}&MediaSourceId={}&PlaySessionId={}&api_key={}\
         &VideoCodec=h264&AudioCodec=aac&SegmentContainer=ts&BreakOnNonKeyFrames=true\
         &TranscodingMaxAudioChannels=2",
        base_url,
        url_encode(item_id),
        url_encode(&DEVICE_ID),
        url_encode(media_source_id),
        url_encode(play_session_id),
        url_encode(token),
    );
    match quality {
        StreamQuality::Bitrate { video_bps, max_width } => {
            url.push_str(&format!("&VideoBitrate={video_bps}&AudioBitrate=192000"));
            if let Some(width) = max_width {
                url.push_str(&format!("&MaxWidth={width}"));
            }
        }
        StreamQuality::Auto => {
            url.push_str("&EnableAutoStreamCopy=true&AllowVideoStreamCopy=true&AllowAudioStreamCopy=true");
        }
    }
    if let Some(idx) = audio_stream_index {
        url.push_str(&format!("&AudioStreamIndex={idx}"));
    }
    if let Some(ticks) = start_ticks {
        url.push_str(&format!("&StartTimeTicks={ticks}"));
    }
    url
}

/// URL-encode a string for safe use in query parameters.
fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn trim_base_url(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = UpstreamClient::new("http://media.local:8096/");
        assert_eq!(client.base_url(), "http://media.local:8096");
        assert!(!client.has_credentials());
    }

    #[test]
    fn client_with_credentials() {
        let client = UpstreamClient::with_credentials("http://media.local", "tok", "u1");
        assert!(client.has_credentials());
    }

    #[test]
    fn master_url_with_bitrate() {
        let url = build_master_url(
            "http://media.local",
            "item1",
            "src1",
            "ps1",
            "tok",
            Some(27_000_000_000),
            StreamQuality::Bitrate { video_bps: 8_000_000, max_width: Some(1920) },
            Some(1),
        );
        assert!(url.starts_with("http://media.local/Videos/item1/master.m3u8?"));
        assert!(url.contains("PlaySessionId=ps1"));
        assert!(url.contains("VideoCodec=h264"));
        assert!(url.contains("AudioCodec=aac"));
        assert!(url.contains("SegmentContainer=ts"));
        assert!(url.contains("BreakOnNonKeyFrames=true"));
        assert!(url.contains("VideoBitrate=8000000"));
        assert!(url.contains("MaxWidth=1920"));
        assert!(url.contains("AudioStreamIndex=1"));
        assert!(url.contains("StartTimeTicks=27000000000"));
    }

    #[test]
    fn master_url_auto_uses_stream_copy() {
        let url = build_master_url(
            "http://media.local",
            "item1",
            "src1",
            "ps1",
            "tok",
            None,
            StreamQuality::Auto,
            None,
        );
        assert!(url.contains("EnableAutoStreamCopy=true"));
        assert!(!url.contains("VideoBitrate="));
        assert!(!url.contains("StartTimeTicks="));
    }

    #[test]
    fn url_encode_escapes_reserved() {
        assert_eq!(url_encode("a b&c"), "a+b%26c");
        assert_eq!(url_encode("plain"), "plain");
    }
}
