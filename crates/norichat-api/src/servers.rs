use axum::{extract::Query, extract::State, Extension, Json};
use serde::Deserialize;
use tracing::warn;

use norichat_types::api::{Claims, MemberInfo, ServerInfo};

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ServerQuery {
    pub server_id: Option<i64>,
}

/// Servers the caller is a member of.
pub async fn list_servers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ServerInfo>>, ApiError> {
    let servers = state.db.get_user_servers(claims.sub).map_err(|e| {
        warn!("get_user_servers failed: {e:#}");
        ApiError::internal("failed to load servers")
    })?;

    Ok(Json(
        servers
            .into_iter()
            .map(|s| ServerInfo {
                id: s.id,
                name: s.name,
                owner_id: s.owner_id,
            })
            .collect(),
    ))
}

pub async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<ServerQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MemberInfo>>, ApiError> {
    let server_id = require_membership(&state, &claims, query.server_id)?;

    let members = state.db.get_server_members(server_id).map_err(|e| {
        warn!("get_server_members failed: {e:#}");
        ApiError::internal("failed to load members")
    })?;

    Ok(Json(
        members
            .into_iter()
            .map(|m| MemberInfo {
                id: m.id,
                username: m.username,
            })
            .collect(),
    ))
}

/// Shared gate for the ?server_id=N directory routes: the id must be present
/// and the caller must be a member.
pub(crate) fn require_membership(
    state: &AppState,
    claims: &Claims,
    server_id: Option<i64>,
) -> Result<i64, ApiError> {
    let server_id = match server_id {
        Some(id) if id > 0 => id,
        _ => return Err(ApiError::bad_request("server_id required")),
    };

    let member = state
        .db
        .has_membership(claims.sub, server_id)
        .map_err(|e| {
            warn!("has_membership failed: {e:#}");
            ApiError::internal("failed to check membership")
        })?;
    if !member {
        return Err(ApiError::forbidden("not a member of this server"));
    }

    Ok(server_id)
}
