use axum::{extract::Query, extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use tracing::{info, warn};

use norichat_types::api::{ChannelInfo, Claims, CreateChannelRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::servers::{require_membership, ServerQuery};

pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<ServerQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChannelInfo>>, ApiError> {
    let server_id = require_membership(&state, &claims, query.server_id)?;

    let channels = state.db.get_server_channels(server_id).map_err(|e| {
        warn!("get_server_channels failed: {e:#}");
        ApiError::internal("failed to load channels")
    })?;

    Ok(Json(channels.into_iter().map(channel_info).collect()))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let server_id = require_membership(&state, &claims, Some(req.server_id).filter(|id| *id > 0))?;

    if req.name.is_empty() {
        return Err(ApiError::bad_request("channel name required"));
    }
    if req.kind != "text" && req.kind != "voice" {
        return Err(ApiError::bad_request("invalid channel type"));
    }

    let channel = state
        .db
        .create_channel(server_id, &req.name, &req.kind)
        .map_err(|e| {
            warn!("create_channel failed: {e:#}");
            ApiError::internal("failed to create channel")
        })?;

    info!(
        "channel {} ({}) created in server {} by user {}",
        channel.name, channel.kind, server_id, claims.sub
    );
    Ok((StatusCode::CREATED, Json(channel_info(channel))))
}

fn channel_info(c: norichat_db::models::Channel) -> ChannelInfo {
    ChannelInfo {
        id: c.id,
        server_id: c.server_id,
        name: c.name,
        kind: c.kind,
    }
}
