//! Per-op command handlers.
//!
//! Every handler runs under the registry guard taken once in [`dispatch`];
//! store calls are short blocking statements made inside that critical
//! section so that a write and its fan-out cannot interleave with another
//! session's. Handlers report failures in-band (ERROR / AUTH_FAIL) and never
//! close the connection themselves.

use jsonwebtoken::{decode as jwt_decode, Algorithm, DecodingKey, Validation};
use tracing::{debug, info, trace, warn};

use norichat_db::Database;
use norichat_types::api::Claims;
use norichat_types::events::{
    decode, truncate_content, ClientCommand, DecodeError, GatewayEvent, MAX_CONTENT_BYTES,
};

use crate::registry::{ConnId, Registry, RegistryState};

/// Route one inbound text frame for `conn_id`.
pub fn dispatch(registry: &Registry, db: &Database, conn_id: ConnId, raw: &str, jwt_secret: &str) {
    let mut reg = registry.lock();

    let cmd = match decode(raw) {
        Ok(cmd) => cmd,
        Err(DecodeError::MalformedJson) => {
            reg.enqueue(conn_id, &GatewayEvent::error("malformed JSON").encode());
            return;
        }
        Err(DecodeError::UnknownOp) => {
            let authed = reg.session(conn_id).is_some_and(|s| s.authed);
            let event = if authed {
                GatewayEvent::error("unknown op")
            } else {
                GatewayEvent::auth_fail("not authenticated")
            };
            reg.enqueue(conn_id, &event.encode());
            return;
        }
    };

    // AUTH is the only op allowed before authentication.
    if let ClientCommand::Auth { token } = &cmd {
        handle_auth(&mut reg, db, conn_id, token, jwt_secret);
        return;
    }

    let Some((user_id, username)) = reg
        .session(conn_id)
        .filter(|s| s.authed)
        .map(|s| (s.user_id, s.username.clone()))
    else {
        reg.enqueue(
            conn_id,
            &GatewayEvent::auth_fail("not authenticated").encode(),
        );
        return;
    };

    match cmd {
        ClientCommand::Auth { .. } => unreachable!("handled above"),
        ClientCommand::ChannelJoin { channel_id } => {
            handle_channel_join(&mut reg, conn_id, channel_id)
        }
        ClientCommand::ChannelLeave { channel_id } => {
            handle_channel_leave(&mut reg, conn_id, channel_id)
        }
        ClientCommand::MessageSend {
            channel_id,
            content,
        } => handle_message_send(&mut reg, db, conn_id, user_id, &username, channel_id, content),
        ClientCommand::MessageEdit {
            message_id,
            content,
        } => handle_message_edit(&mut reg, db, conn_id, user_id, message_id, content),
        ClientCommand::MessageDelete { message_id } => {
            handle_message_delete(&mut reg, db, conn_id, user_id, message_id)
        }
        ClientCommand::VoiceJoin { channel_id } => {
            handle_voice_join(&mut reg, conn_id, user_id, &username, channel_id)
        }
        ClientCommand::VoiceLeave { channel_id } => {
            handle_voice_leave(&mut reg, conn_id, user_id, channel_id)
        }
        ClientCommand::VoiceData { channel_id, .. } => {
            handle_voice_data(&mut reg, conn_id, user_id, channel_id, raw)
        }
    }
}

fn send_error(reg: &mut RegistryState, conn_id: ConnId, msg: &str) {
    reg.enqueue(conn_id, &GatewayEvent::error(msg).encode());
}

fn handle_auth(
    reg: &mut RegistryState,
    db: &Database,
    conn_id: ConnId,
    token: &str,
    jwt_secret: &str,
) {
    if reg.session(conn_id).is_some_and(|s| s.authed) {
        send_error(reg, conn_id, "already authenticated");
        return;
    }

    let Some(user_id) = validate_token(token, jwt_secret) else {
        reg.enqueue(
            conn_id,
            &GatewayEvent::auth_fail("invalid or expired token").encode(),
        );
        return;
    };

    let user = match db.find_user_by_id(user_id) {
        Ok(Some(user)) => user,
        Ok(None) => {
            reg.enqueue(conn_id, &GatewayEvent::auth_fail("user not found").encode());
            return;
        }
        Err(e) => {
            warn!("auth lookup failed: {e:#}");
            send_error(reg, conn_id, "failed to load user");
            return;
        }
    };

    let Some(session) = reg.session_mut(conn_id) else {
        return;
    };
    session.user_id = user.id;
    session.username = user.username.clone();
    session.authed = true;

    let online = reg.online_snapshot(conn_id);
    reg.enqueue(
        conn_id,
        &GatewayEvent::AuthOk {
            user_id: user.id,
            username: user.username.clone(),
            online,
        }
        .encode(),
    );

    // Everyone else learns the user came online.
    let notice = GatewayEvent::UserOnline {
        user_id: user.id,
        username: user.username.clone(),
    }
    .encode();
    reg.broadcast_authed(&notice, Some(conn_id));

    info!("{} ({}) authenticated on conn {}", user.username, user.id, conn_id);
}

/// Validate an HS256 token: three dot-joined segments, matching signature,
/// unexpired, positive integer subject. Returns the user id.
fn validate_token(token: &str, jwt_secret: &str) -> Option<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = jwt_decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .ok()?;
    (data.claims.sub > 0).then_some(data.claims.sub)
}

fn handle_channel_join(reg: &mut RegistryState, conn_id: ConnId, channel_id: i64) {
    if channel_id <= 0 {
        send_error(reg, conn_id, "invalid channel_id");
        return;
    }
    if let Some(session) = reg.session_mut(conn_id) {
        session.subscribed_channels.insert(channel_id);
    }
}

fn handle_channel_leave(reg: &mut RegistryState, conn_id: ConnId, channel_id: i64) {
    if let Some(session) = reg.session_mut(conn_id) {
        session.subscribed_channels.remove(&channel_id);
    }
}

fn handle_message_send(
    reg: &mut RegistryState,
    db: &Database,
    conn_id: ConnId,
    user_id: i64,
    username: &str,
    channel_id: i64,
    mut content: String,
) {
    if channel_id <= 0 || content.is_empty() {
        send_error(reg, conn_id, "invalid channel_id or empty content");
        return;
    }
    truncate_content(&mut content, MAX_CONTENT_BYTES);

    let new = match db.add_message(channel_id, user_id, &content) {
        Ok(new) => new,
        Err(e) => {
            warn!("add_message failed: {e:#}");
            send_error(reg, conn_id, "failed to save message");
            return;
        }
    };

    // Subscribers — the sender included — see the message only via this
    // broadcast, which is the canonical ordering source.
    let event = GatewayEvent::MessageNew {
        id: new.id,
        channel_id,
        author_id: user_id,
        author: username.to_string(),
        content,
        ts: new.ts,
    }
    .encode();
    reg.broadcast_text(channel_id, &event);
    debug!("message {} posted to channel {}", new.id, channel_id);
}

fn handle_message_edit(
    reg: &mut RegistryState,
    db: &Database,
    conn_id: ConnId,
    user_id: i64,
    message_id: i64,
    mut content: String,
) {
    if message_id <= 0 || content.is_empty() {
        send_error(reg, conn_id, "invalid message_id or empty content");
        return;
    }
    truncate_content(&mut content, MAX_CONTENT_BYTES);

    // Pre-check for a friendly error; the update statement below re-checks
    // author and window atomically and stays authoritative.
    let original = match db.get_message_by_id(message_id) {
        Ok(m) => m,
        Err(e) => {
            warn!("get_message_by_id failed: {e:#}");
            send_error(reg, conn_id, "failed to load message");
            return;
        }
    };
    let Some(original) = original.filter(|m| m.author_id == user_id) else {
        send_error(reg, conn_id, "message not found or not yours");
        return;
    };

    match db.update_message(message_id, user_id, &content) {
        Ok(true) => {}
        Ok(false) => {
            send_error(reg, conn_id, "cannot edit: too old or not found");
            return;
        }
        Err(e) => {
            warn!("update_message failed: {e:#}");
            send_error(reg, conn_id, "failed to update message");
            return;
        }
    }

    let event = GatewayEvent::MessageEdited {
        message_id,
        channel_id: original.channel_id,
        content,
    }
    .encode();
    reg.broadcast_text(original.channel_id, &event);
}

fn handle_message_delete(
    reg: &mut RegistryState,
    db: &Database,
    conn_id: ConnId,
    user_id: i64,
    message_id: i64,
) {
    if message_id <= 0 {
        send_error(reg, conn_id, "invalid message_id");
        return;
    }

    let original = match db.get_message_by_id(message_id) {
        Ok(m) => m,
        Err(e) => {
            warn!("get_message_by_id failed: {e:#}");
            send_error(reg, conn_id, "failed to load message");
            return;
        }
    };
    let Some(original) = original.filter(|m| m.author_id == user_id) else {
        send_error(reg, conn_id, "message not found or not yours");
        return;
    };

    match db.delete_message(message_id, user_id) {
        Ok(true) => {}
        Ok(false) => {
            send_error(reg, conn_id, "cannot delete: too old or not found");
            return;
        }
        Err(e) => {
            warn!("delete_message failed: {e:#}");
            send_error(reg, conn_id, "failed to delete message");
            return;
        }
    }

    let event = GatewayEvent::MessageDeleted {
        message_id,
        channel_id: original.channel_id,
    }
    .encode();
    reg.broadcast_text(original.channel_id, &event);
}

fn handle_voice_join(
    reg: &mut RegistryState,
    conn_id: ConnId,
    user_id: i64,
    username: &str,
    channel_id: i64,
) {
    if channel_id <= 0 {
        send_error(reg, conn_id, "invalid channel_id");
        return;
    }

    let participants = reg.voice_participants(channel_id, conn_id);
    let newly_joined = match reg.session_mut(conn_id) {
        Some(session) => session.voice_channels.insert(channel_id),
        None => return,
    };

    reg.enqueue(
        conn_id,
        &GatewayEvent::VoiceJoinOk {
            channel_id,
            participants,
        }
        .encode(),
    );

    if newly_joined {
        let event = GatewayEvent::VoiceJoined {
            channel_id,
            user_id,
            username: username.to_string(),
        }
        .encode();
        reg.broadcast_voice(channel_id, &event, conn_id);
        info!("{} ({}) joined voice channel {}", username, user_id, channel_id);
    }
}

fn handle_voice_leave(reg: &mut RegistryState, conn_id: ConnId, user_id: i64, channel_id: i64) {
    let was_participant = match reg.session_mut(conn_id) {
        Some(session) => session.voice_channels.remove(&channel_id),
        None => return,
    };
    if !was_participant {
        return;
    }

    let event = GatewayEvent::VoiceLeft {
        channel_id,
        user_id,
    }
    .encode();
    reg.broadcast_voice(channel_id, &event, conn_id);
    info!("user {} left voice channel {}", user_id, channel_id);
}

fn handle_voice_data(
    reg: &mut RegistryState,
    conn_id: ConnId,
    user_id: i64,
    channel_id: i64,
    raw: &str,
) {
    if channel_id <= 0 {
        send_error(reg, conn_id, "invalid channel_id");
        return;
    }
    let is_participant = reg
        .session(conn_id)
        .is_some_and(|s| s.voice_channels.contains(&channel_id));
    if !is_participant {
        send_error(reg, conn_id, "not in voice channel");
        return;
    }

    trace!(
        "relaying {} bytes of voice payload from user {} in channel {}",
        raw.len(),
        user_id,
        channel_id
    );
    // The inbound envelope is relayed verbatim; the server never decodes
    // or re-encodes the audio payload.
    reg.broadcast_voice(channel_id, raw, conn_id);
}
