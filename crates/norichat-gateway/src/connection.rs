//! WebSocket connection lifecycle.
//!
//! Each accepted socket gets a registry slot and two tasks: a writer that
//! drains the session's outbound queue one frame per wakeup, and a reader
//! that feeds inbound text frames to the router. When either side ends, the
//! other is aborted, the session is removed, and — if it had authenticated —
//! USER_OFFLINE goes out to everyone still connected.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use norichat_db::Database;
use norichat_types::events::GatewayEvent;

use crate::registry::{Outbound, Registry};
use crate::router;

/// Handle one WebSocket connection until it closes.
pub async fn handle_socket(
    socket: WebSocket,
    registry: Registry,
    db: Arc<Database>,
    jwt_secret: Arc<str>,
) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, notify) = registry.lock().insert();
    debug!("conn {} established", conn_id);

    // Writer: pop one payload per iteration, park on the notify when idle.
    // Partial-progress state lives in the registry queue, so nothing is lost
    // between wakeups.
    let write_registry = registry.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let next = write_registry.lock().pop_outbound(conn_id);
            match next {
                Outbound::Payload(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Idle => notify.notified().await,
                Outbound::Closed => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader: one logical message per frame sequence (the transport
    // reassembles fragments and enforces the inbound size cap; oversize
    // input surfaces as a stream error and ends this loop).
    let read_registry = registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    router::dispatch(&read_registry, &db, conn_id, text.as_str(), &jwt_secret);
                }
                Message::Close(_) => break,
                // Ping/Pong are answered by the transport layer.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Remove first, then announce: the dead session can no longer be a
    // broadcast target, so it never sees its own USER_OFFLINE.
    let mut reg = registry.lock();
    if let Some(removed) = reg.remove(conn_id) {
        if removed.authed {
            let event = GatewayEvent::UserOffline {
                user_id: removed.user_id,
            }
            .encode();
            reg.broadcast_authed(&event, None);
            info!(
                "{} ({}) disconnected from gateway",
                removed.username, removed.user_id
            );
        } else {
            debug!("conn {} closed before authenticating", conn_id);
        }
    }
}
