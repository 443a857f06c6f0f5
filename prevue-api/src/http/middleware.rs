// HTTP middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::{AppError, AppState};

/// Paths reachable without the shared API key.
const PUBLIC_PATHS: &[&str] = &["/api/health", "/api/auth/status"];

/// Shared-secret gate: when an API key is configured, every request must
/// carry it in the `X-API-Key` header or an `api_key` query parameter.
/// Health and auth-status stay public so setup UIs can probe the gate.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.auth.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let path = request.uri().path();
    if PUBLIC_PATHS.contains(&path) {
        return Ok(next.run(request).await);
    }

    let header_key = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());
    let query_key = request.uri().query().and_then(extract_api_key_param);

    let presented = header_key.or(query_key.as_deref());
    match presented {
        Some(key) if key == expected => Ok(next.run(request).await),
        Some(_) => Err(AppError::unauthorized("Invalid API key")),
        None => Err(AppError::unauthorized("API key required")),
    }
}

fn extract_api_key_param(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "api_key").then(|| value.to_string())
    })
}
