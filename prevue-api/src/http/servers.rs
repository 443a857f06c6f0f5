//! Server management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use prevue_core::models::MediaServer;
use prevue_core::validation::validate_upstream_url;
use prevue_upstream::UpstreamClient;

use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateServerRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReauthenticateRequest {
    pub password: String,
}

pub async fn list(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let servers = state.servers.list().await?;
    Ok(Json(servers))
}

/// Register a server: validate the URL, authenticate against Upstream,
/// persist the encrypted token. The first server becomes active.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateServerRequest>,
) -> AppResult<impl IntoResponse> {
    if request.name.trim().is_empty() {
        return Err(AppError::bad_request("Server name is required"));
    }
    let url = validate_upstream_url(&request.url, state.config.security.allow_private_urls)?;
    let base_url = url.as_str().trim_end_matches('/').to_string();

    let mut client = UpstreamClient::new(&base_url);
    let (token, user_id) = client
        .authenticate(&request.username, &request.password)
        .await?;

    let server = MediaServer::new(&request.name, &base_url, &request.username, token, user_id);
    state.servers.create(&server).await?;

    let no_active = state.servers.get_active().await?.is_none();
    if no_active {
        state.servers.set_active(&server.id).await?;
    }

    let created = state.servers.get(&server.id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateServerRequest>,
) -> AppResult<impl IntoResponse> {
    let current = state.servers.get(&id).await?;
    let name = request.name.unwrap_or(current.name);
    let username = request.username.unwrap_or(current.username);
    let base_url = match request.url {
        Some(raw) => {
            let url = validate_upstream_url(&raw, state.config.security.allow_private_urls)?;
            url.as_str().trim_end_matches('/').to_string()
        }
        None => current.base_url,
    };

    state.servers.update(&id, &name, &base_url, &username).await?;
    Ok(Json(state.servers.get(&id).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.servers.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Probe connectivity for a stored server.
pub async fn test(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let server = state.servers.get(&id).await?;
    let client = UpstreamClient::with_credentials(
        &server.base_url,
        &server.access_token,
        &server.upstream_user_id,
    );
    let info = client.test_connection().await?;
    Ok(Json(json!({
        "ok": true,
        "server_name": info.server_name,
        "version": info.version,
    })))
}

/// Refresh credentials after the Upstream token expired.
pub async fn reauthenticate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ReauthenticateRequest>,
) -> AppResult<impl IntoResponse> {
    let server = state.servers.get(&id).await?;
    let mut client = UpstreamClient::new(&server.base_url);
    let (token, user_id) = client
        .authenticate(&server.username, &request.password)
        .await?;
    state.servers.update_credentials(&id, &token, &user_id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// Switch the active server and kick off a background library sync.
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.servers.set_active(&id).await?;
    let server = state.servers.get(&id).await?;

    let sync = state.library_sync.clone();
    tokio::spawn(async move {
        if let Err(e) = sync.sync(&server).await {
            tracing::warn!(error = %e, "Library sync after activation failed");
        }
    });

    Ok(Json(json!({ "ok": true })))
}
