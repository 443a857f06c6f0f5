// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Optional Retry-After value in seconds (503 responses).
    pub retry_after: Option<u64>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), retry_after: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 503 with a Retry-After header; used by IPTV when nothing is airing.
    #[must_use]
    pub fn unavailable_retry_after(message: impl Into<String>, seconds: u64) -> Self {
        let mut err = Self::new(StatusCode::SERVICE_UNAVAILABLE, message);
        err.retry_after = Some(seconds);
        err
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });
        let mut response = (status, body).into_response();
        if let Some(seconds) = self.retry_after {
            if let Ok(value) = seconds.to_string().parse() {
                response.headers_mut().insert(http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Convert core errors to HTTP errors
impl From<prevue_core::Error> for AppError {
    fn from(err: prevue_core::Error) -> Self {
        use prevue_core::Error;

        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::AlreadyExists(msg) => Self::conflict(msg),
            Error::InvalidInput(msg) => Self::bad_request(msg),
            Error::Upstream(err) => Self::from(err),
            Error::Config(msg) => {
                tracing::error!("Config error: {}", msg);
                Self::internal("Configuration error")
            }
            Error::Database(e) => {
                tracing::error!("Database error: {}", e);
                Self::internal("Database error")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                Self::internal("Data processing error")
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                Self::internal("Internal server error")
            }
        }
    }
}

/// Convert Upstream client errors to HTTP errors
impl From<prevue_upstream::UpstreamError> for AppError {
    fn from(err: prevue_upstream::UpstreamError) -> Self {
        use prevue_upstream::UpstreamError;

        match &err {
            UpstreamError::AuthExpired => {
                Self::unauthorized("Upstream authentication expired; re-authenticate the server")
            }
            UpstreamError::Http { status, .. } if status.is_server_error() => {
                tracing::warn!("Upstream server fault: {}", err);
                Self::bad_gateway("Upstream media server error")
            }
            UpstreamError::Http { status, .. } => {
                Self::new(
                    axum::http::StatusCode::from_u16(status.as_u16())
                        .unwrap_or(StatusCode::BAD_GATEWAY),
                    format!("Upstream rejected the request: {status}"),
                )
            }
            UpstreamError::Network(msg) => {
                tracing::warn!("Upstream unreachable: {}", msg);
                Self::bad_gateway("Upstream media server unreachable")
            }
            _ => {
                tracing::error!("Upstream error: {}", err);
                Self::internal("Upstream request failed")
            }
        }
    }
}

/// Convert `serde_json` errors to HTTP errors
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {}", err);
        Self::bad_request("Invalid request data format")
    }
}

/// Convert anyhow errors to HTTP errors
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Error: {}", err);
        Self::internal("Internal server error")
    }
}
