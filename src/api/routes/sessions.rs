//! Session Routes
//!
//! - GET /api/v1/sessions - Connected controllers and producers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::SessionListResponse;
use crate::api::state::AppState;

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    let controllers = state.controllers.describe().await;
    let producers = state.producers.describe().await;

    Json(SessionListResponse {
        total: controllers.len() + producers.len(),
        controllers,
        producers,
    })
}
