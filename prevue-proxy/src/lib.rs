//! HLS proxy plumbing
//!
//! Playlist rewriting and request coalescing for the stream proxy. The
//! rewriter points every media reference in an Upstream playlist back at
//! our own proxy endpoint with the session identifiers threaded through;
//! the coalescer collapses concurrent fetches of the same Upstream URL
//! into one request.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

/// Where rewritten playlist entries point.
pub const PROXY_PREFIX: &str = "/api/stream/proxy";

/// How long a completed fetch remains servable to rapid client retries.
const COALESCE_RETENTION: Duration = Duration::from_millis(100);

/// Session identity threaded through rewritten URLs.
#[derive(Debug, Clone, Copy)]
pub struct RewriteParams<'a> {
    pub play_session_id: &'a str,
    pub device_id: &'a str,
}

/// Rewrite an Upstream master or child playlist so every `.m3u8`, `.ts`
/// and `.vtt` reference proxies through [`PROXY_PREFIX`].
///
/// Absolute URLs are reduced to path+query first. `PlaySessionId` and
/// `DeviceId` are ensured on each rewritten URL; `StartTimeTicks` is
/// stripped from segment (`.ts`) URLs so seeks don't restart transcodes.
#[must_use]
pub fn rewrite_playlist(playlist: &str, params: &RewriteParams<'_>) -> String {
    let mut output = String::with_capacity(playlist.len() * 2);
    for line in playlist.lines() {
        if line.starts_with('#') {
            output.push_str(&rewrite_uri_attribute(line, params));
        } else if is_media_ref(line.trim()) {
            output.push_str(&rewrite_url(line.trim(), params));
        } else {
            output.push_str(line);
        }
        output.push('\n');
    }
    output
}

/// Rewrite any `URI="..."` value inside a playlist tag line.
fn rewrite_uri_attribute(line: &str, params: &RewriteParams<'_>) -> String {
    let pattern = "URI=\"";
    let mut result = String::with_capacity(line.len());
    let mut remaining = line;

    while let Some(start) = remaining.find(pattern) {
        result.push_str(&remaining[..start + pattern.len()]);
        remaining = &remaining[start + pattern.len()..];

        if let Some(end) = remaining.find('"') {
            let uri = &remaining[..end];
            if is_media_ref(uri) {
                result.push_str(&rewrite_url(uri, params));
            } else {
                result.push_str(uri);
            }
            result.push('"');
            remaining = &remaining[end + 1..];
        } else {
            result.push_str(remaining);
            remaining = "";
        }
    }

    result.push_str(remaining);
    result
}

/// True when the path portion references HLS media we proxy.
fn is_media_ref(raw: &str) -> bool {
    if raw.is_empty() {
        return false;
    }
    let path = raw.split('?').next().unwrap_or(raw);
    let path = match path.find("://") {
        Some(idx) => path[idx + 3..].split_once('/').map_or("", |(_, rest)| rest),
        None => path,
    };
    [".m3u8", ".ts", ".vtt"].iter().any(|ext| path.ends_with(ext))
}

fn rewrite_url(raw: &str, params: &RewriteParams<'_>) -> String {
    let (path, query) = normalize_to_path_query(raw);
    let is_segment = path.ends_with(".ts");

    let mut pairs: Vec<(String, String)> = Vec::new();
    if !query.is_empty() {
        for piece in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = piece.split_once('=').unwrap_or((piece, ""));
            // Seek position is fixed by the session; re-sending it per
            // segment restarts the transcode job.
            if is_segment && key.eq_ignore_ascii_case("StartTimeTicks") {
                continue;
            }
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    if !pairs.iter().any(|(k, _)| k.eq_ignore_ascii_case("PlaySessionId")) {
        pairs.push(("PlaySessionId".to_string(), params.play_session_id.to_string()));
    }
    if !pairs.iter().any(|(k, _)| k.eq_ignore_ascii_case("DeviceId")) {
        pairs.push(("DeviceId".to_string(), params.device_id.to_string()));
    }

    let query: Vec<String> = pairs
        .into_iter()
        .map(|(k, v)| if v.is_empty() { k } else { format!("{k}={v}") })
        .collect();
    let path = if path.starts_with('/') { path } else { format!("/{path}") };
    format!("{PROXY_PREFIX}{path}?{}", query.join("&"))
}

/// Reduce an absolute or relative reference to (path, query).
fn normalize_to_path_query(raw: &str) -> (String, String) {
    if raw.contains("://") {
        if let Ok(parsed) = url::Url::parse(raw) {
            return (
                parsed.path().to_string(),
                parsed.query().unwrap_or("").to_string(),
            );
        }
    }
    match raw.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

/// A fetched Upstream response, cheap to clone between coalesced waiters.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl ProxiedResponse {
    /// Whether this response body is a playlist to rewrite rather than
    /// bytes to forward.
    #[must_use]
    pub fn is_playlist(&self, url: &str) -> bool {
        let path_is_playlist = url.split('?').next().unwrap_or(url).ends_with(".m3u8");
        let type_is_playlist = self.content_type.as_deref().is_some_and(|ct| {
            ct.contains("mpegurl") || ct.starts_with("text/plain")
        });
        path_is_playlist || type_is_playlist
    }
}

/// Collapses concurrent fetches of one Upstream URL into a single request.
///
/// In-flight identical requests share one future via singleflight; the
/// result then stays servable for ~100 ms to absorb rapid client retries
/// before it is released.
pub struct Coalescer {
    group: Arc<async_singleflight::Group<String, ProxiedResponse, String>>,
    recent: moka::future::Cache<String, ProxiedResponse>,
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl Coalescer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
            recent: moka::future::Cache::builder()
                .max_capacity(256)
                .time_to_live(COALESCE_RETENTION)
                .build(),
        }
    }

    /// Run `fetch` for this URL unless an identical request is in flight or
    /// just completed, in which case its result is shared.
    pub async fn fetch<Fut>(&self, url: String, fetch: Fut) -> Result<ProxiedResponse, String>
    where
        Fut: std::future::Future<Output = Result<ProxiedResponse, String>> + Send,
    {
        if let Some(hit) = self.recent.get(&url).await {
            return Ok(hit);
        }
        let response = self
            .group
            .work(&url, fetch)
            .await
            .map_err(|err| err.unwrap_or_else(|| "coalesced fetch leader failed".to_string()))?;
        self.recent.insert(url, response.clone()).await;
        Ok(response)
    }
}

/// Fetch an Upstream URL into a [`ProxiedResponse`]. Network failures are
/// errors; HTTP error statuses are returned as responses so callers can
/// translate them.
pub async fn fetch_upstream(
    client: &reqwest::Client,
    url: &str,
) -> Result<ProxiedResponse, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Upstream fetch failed: {e}"))?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let body = response
        .bytes()
        .await
        .map_err(|e| format!("Upstream body read failed: {e}"))?;
    Ok(ProxiedResponse { status, content_type, body })
}
