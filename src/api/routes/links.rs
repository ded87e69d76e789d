//! Link Routes
//!
//! Managed outbound links to companion devices.
//!
//! - POST /api/v1/links - Establish a link
//! - GET /api/v1/links - List links
//! - GET /api/v1/links/:id - Link status
//! - DELETE /api/v1/links/:id - Disconnect a link

use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::{CreateLinkRequest, LinkListResponse, LinkResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// POST /api/v1/links
///
/// Connects to the device, retrying up to the configured budget. Rate
/// limited per peer address.
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(request): Json<CreateLinkRequest>,
) -> ApiResult<(StatusCode, Json<LinkResponse>)> {
    state.admit(peer.ip())?;
    let request = request.validate()?;

    let connection = state
        .links
        .establish(&request.device_id, &request.address, request.transport)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LinkResponse {
            status: "success".to_string(),
            connection,
        }),
    ))
}

/// GET /api/v1/links
pub async fn list_links(State(state): State<Arc<AppState>>) -> Json<LinkListResponse> {
    let links = state.links.list().await;
    let active = links.iter().filter(|l| l.active).count();

    Json(LinkListResponse {
        total: links.len(),
        active,
        links,
    })
}

/// GET /api/v1/links/:id
pub async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LinkResponse>> {
    let connection = state
        .links
        .status(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("link {}", id)))?;

    Ok(Json(LinkResponse {
        status: "success".to_string(),
        connection,
    }))
}

/// DELETE /api/v1/links/:id
pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LinkResponse>> {
    let connection = state.links.disconnect(id).await?;

    Ok(Json(LinkResponse {
        status: "success".to_string(),
        connection,
    }))
}
