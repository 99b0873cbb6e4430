use serde::{Deserialize, Serialize};

/// JWT claims carried by every token the server mints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id. Must be > 0 in any token the server accepts.
    pub sub: i64,
    pub username: String,
    /// Expiry, unix seconds.
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Returned by both register (201) and login (200).
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    #[serde(default)]
    pub server_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: i64,
    pub channel_id: i64,
    pub author_id: i64,
    pub author: String,
    pub content: String,
    pub ts: i64,
}
