use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum stored message content, in bytes. Longer content is truncated,
/// not rejected.
pub const MAX_CONTENT_BYTES: usize = 4000;

/// Commands sent FROM client TO server over the WebSocket.
///
/// The wire shape is a flat envelope: `{"op": "MESSAGE_SEND", "channel_id": 1,
/// "content": "hi"}`. Absent fields decode to their defaults (0 / empty
/// string) rather than failing the whole envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum ClientCommand {
    /// Authenticate the connection. Must be the first command of a session.
    #[serde(rename = "AUTH")]
    Auth {
        #[serde(default)]
        token: String,
    },

    /// Subscribe to broadcast events for a text channel.
    #[serde(rename = "CHANNEL_JOIN")]
    ChannelJoin {
        #[serde(default)]
        channel_id: i64,
    },

    /// Drop a text-channel subscription.
    #[serde(rename = "CHANNEL_LEAVE")]
    ChannelLeave {
        #[serde(default)]
        channel_id: i64,
    },

    #[serde(rename = "MESSAGE_SEND")]
    MessageSend {
        #[serde(default)]
        channel_id: i64,
        #[serde(default)]
        content: String,
    },

    #[serde(rename = "MESSAGE_EDIT")]
    MessageEdit {
        #[serde(default)]
        message_id: i64,
        #[serde(default)]
        content: String,
    },

    #[serde(rename = "MESSAGE_DELETE")]
    MessageDelete {
        #[serde(default)]
        message_id: i64,
    },

    /// Join a voice channel as a participant.
    #[serde(rename = "VOICE_JOIN")]
    VoiceJoin {
        #[serde(default)]
        channel_id: i64,
    },

    #[serde(rename = "VOICE_LEAVE")]
    VoiceLeave {
        #[serde(default)]
        channel_id: i64,
    },

    /// Carry one frame of base64 PCM to the other participants. The server
    /// relays the envelope verbatim and never inspects `data`.
    #[serde(rename = "VOICE_DATA")]
    VoiceData {
        #[serde(default)]
        channel_id: i64,
        #[serde(default)]
        data: String,
    },
}

/// Opcodes the codec recognizes. Kept in sync with [`ClientCommand`] so the
/// decoder can tell an unknown op from a recognized op with bad fields.
const CLIENT_OPS: &[&str] = &[
    "AUTH",
    "CHANNEL_JOIN",
    "CHANNEL_LEAVE",
    "MESSAGE_SEND",
    "MESSAGE_EDIT",
    "MESSAGE_DELETE",
    "VOICE_JOIN",
    "VOICE_LEAVE",
    "VOICE_DATA",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not valid JSON, or a recognized op with mis-typed fields.
    MalformedJson,
    /// The `op` field is absent, not a string, or not a recognized opcode.
    UnknownOp,
}

/// Decode one inbound text frame into a command.
pub fn decode(raw: &str) -> Result<ClientCommand, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| DecodeError::MalformedJson)?;

    let known = value
        .get("op")
        .and_then(Value::as_str)
        .is_some_and(|op| CLIENT_OPS.contains(&op));
    if !known {
        return Err(DecodeError::UnknownOp);
    }

    serde_json::from_value(value).map_err(|_| DecodeError::MalformedJson)
}

/// `{user_id, username}` pair used in presence snapshots and voice
/// participant lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub user_id: i64,
    pub username: String,
}

/// Events sent FROM server TO client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum GatewayEvent {
    #[serde(rename = "AUTH_OK")]
    AuthOk {
        user_id: i64,
        username: String,
        /// Every *other* currently authenticated session.
        online: Vec<UserRef>,
    },

    #[serde(rename = "AUTH_FAIL")]
    AuthFail { error: String },

    #[serde(rename = "MESSAGE_NEW")]
    MessageNew {
        id: i64,
        channel_id: i64,
        author_id: i64,
        author: String,
        content: String,
        ts: i64,
    },

    #[serde(rename = "MESSAGE_EDITED")]
    MessageEdited {
        message_id: i64,
        channel_id: i64,
        content: String,
    },

    #[serde(rename = "MESSAGE_DELETED")]
    MessageDeleted { message_id: i64, channel_id: i64 },

    #[serde(rename = "USER_ONLINE")]
    UserOnline { user_id: i64, username: String },

    #[serde(rename = "USER_OFFLINE")]
    UserOffline { user_id: i64 },

    #[serde(rename = "VOICE_JOIN_OK")]
    VoiceJoinOk {
        channel_id: i64,
        /// Who was already in the channel, excluding the joiner.
        participants: Vec<UserRef>,
    },

    #[serde(rename = "VOICE_JOINED")]
    VoiceJoined {
        channel_id: i64,
        user_id: i64,
        username: String,
    },

    #[serde(rename = "VOICE_LEFT")]
    VoiceLeft { channel_id: i64, user_id: i64 },

    #[serde(rename = "ERROR")]
    Error { error: String },
}

impl GatewayEvent {
    pub fn error(msg: impl Into<String>) -> Self {
        GatewayEvent::Error { error: msg.into() }
    }

    pub fn auth_fail(msg: impl Into<String>) -> Self {
        GatewayEvent::AuthFail { error: msg.into() }
    }

    /// Serialize to the outbound JSON text frame.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("gateway event serializes")
    }
}

/// Truncate `content` to at most `max_bytes` bytes, backing off to the
/// nearest UTF-8 character boundary.
pub fn truncate_content(content: &mut String, max_bytes: usize) {
    if content.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content.truncate(end);
}
