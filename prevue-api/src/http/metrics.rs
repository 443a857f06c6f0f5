//! Watch metrics endpoint

use axum::{extract::State, response::IntoResponse, Json};

use super::{AppResult, AppState};

/// Aggregated viewing totals per channel.
pub async fn watch_totals(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.watch_metrics.totals_by_channel().await?))
}
