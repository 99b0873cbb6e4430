//! Row types for the five tables. The wire-facing DTOs live in
//! norichat-types; these stay serde-free so the store layer never depends
//! on the wire format.

pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: i64,
}

pub struct Server {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
}

pub struct Channel {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub kind: String,
}

pub struct Message {
    pub id: i64,
    pub channel_id: i64,
    pub author_id: i64,
    /// Author's username, joined from users.
    pub author: String,
    pub content: String,
    pub ts: i64,
}

pub struct Member {
    pub id: i64,
    pub username: String,
}

/// Returned by `add_message`: the store-assigned id and timestamp.
pub struct NewMessage {
    pub id: i64,
    pub ts: i64,
}
