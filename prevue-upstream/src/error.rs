//! Upstream client error types

use thiserror::Error;

/// Maximum response body size accepted from Upstream (64 MiB). Library
/// listings for large collections are paged well below this.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status} for {url}")]
    Http { status: reqwest::StatusCode, url: String },

    #[error("Upstream authentication expired")]
    AuthExpired,

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

impl UpstreamError {
    /// True when the error is an Upstream-side 5xx (transcoder fault).
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::Http { status, .. } if status.is_server_error())
    }
}

/// Check HTTP response status before processing the body.
///
/// 401 is mapped to `AuthExpired` so callers can clear cached credentials
/// and surface a re-authentication prompt instead of retrying.
pub fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(UpstreamError::AuthExpired);
    }
    if status.is_client_error() || status.is_server_error() {
        return Err(UpstreamError::Http {
            status,
            url: resp.url().to_string(),
        });
    }
    Ok(resp)
}

/// Decode a JSON body with a size cap, guarding against a misbehaving origin
/// streaming an unbounded response.
pub async fn json_with_limit<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, UpstreamError> {
    if let Some(len) = resp.content_length() {
        if len as usize > MAX_BODY_BYTES {
            return Err(UpstreamError::Parse(format!(
                "Response body too large: {len} bytes"
            )));
        }
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > MAX_BODY_BYTES {
        return Err(UpstreamError::Parse(format!(
            "Response body too large: {} bytes",
            bytes.len()
        )));
    }
    serde_json::from_slice(&bytes).map_err(Into::into)
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for UpstreamError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}
