use axum::{extract::Query, extract::State, Extension, Json};
use serde::Deserialize;
use tracing::warn;

use norichat_types::api::{Claims, MessageInfo};

use crate::auth::AppState;
use crate::error::ApiError;

const DEFAULT_MSG_LIMIT: u32 = 50;
const MAX_MSG_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub channel_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Channel history: fetched newest-first from the store, returned in
/// chronological order.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<MessageInfo>>, ApiError> {
    let channel_id = match query.channel_id {
        Some(id) if id > 0 => id,
        _ => return Err(ApiError::bad_request("channel_id required")),
    };

    // Out-of-range limits fall back to the default rather than erroring.
    let limit = match query.limit {
        Some(limit) if (1..=MAX_MSG_LIMIT as i64).contains(&limit) => limit as u32,
        _ => DEFAULT_MSG_LIMIT,
    };

    let mut rows = state.db.get_messages(channel_id, limit).map_err(|e| {
        warn!("get_messages failed: {e:#}");
        ApiError::internal("failed to load messages")
    })?;
    rows.reverse();

    Ok(Json(
        rows.into_iter()
            .map(|m| MessageInfo {
                id: m.id,
                channel_id: m.channel_id,
                author_id: m.author_id,
                author: m.author,
                content: m.content,
                ts: m.ts,
            })
            .collect(),
    ))
}
