use crate::models::{Channel, Member, Message, NewMessage, Server, User};
use crate::Database;
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

/// Messages may be edited or deleted by their author for this long.
pub const EDIT_WINDOW_SECS: i64 = 7 * 86_400;

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let user = self.conn()?.query_row(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)
             RETURNING id, username, password_hash, created_at",
            params![username, password_hash, now_ts()],
            row_to_user,
        )?;
        Ok(user)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn()?
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                [username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn()?
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
                [id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    // -- Memberships --

    /// Idempotent: joining a server twice is not an error.
    pub fn add_membership(&self, user_id: i64, server_id: i64) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO memberships (user_id, server_id) VALUES (?1, ?2)",
            params![user_id, server_id],
        )?;
        Ok(())
    }

    pub fn has_membership(&self, user_id: i64, server_id: i64) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM memberships WHERE user_id = ?1 AND server_id = ?2",
                params![user_id, server_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // -- Servers --

    pub fn create_server(&self, name: &str, owner_id: i64) -> Result<Server> {
        let server = self.conn()?.query_row(
            "INSERT INTO servers (name, owner_id) VALUES (?1, ?2)
             RETURNING id, name, owner_id",
            params![name, owner_id],
            |row| {
                Ok(Server {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    owner_id: row.get(2)?,
                })
            },
        )?;
        Ok(server)
    }

    pub fn get_user_servers(&self, user_id: i64) -> Result<Vec<Server>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.owner_id FROM servers s
             JOIN memberships m ON m.server_id = s.id
             WHERE m.user_id = ?1 ORDER BY s.id",
        )?;
        let servers = stmt
            .query_map([user_id], |row| {
                Ok(Server {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    owner_id: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(servers)
    }

    pub fn get_server_members(&self, server_id: i64) -> Result<Vec<Member>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username FROM users u
             JOIN memberships m ON m.user_id = u.id
             WHERE m.server_id = ?1 ORDER BY u.id",
        )?;
        let members = stmt
            .query_map([server_id], |row| {
                Ok(Member {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    // -- Channels --

    pub fn create_channel(&self, server_id: i64, name: &str, kind: &str) -> Result<Channel> {
        let channel = self.conn()?.query_row(
            "INSERT INTO channels (server_id, name, type) VALUES (?1, ?2, ?3)
             RETURNING id, server_id, name, type",
            params![server_id, name, kind],
            row_to_channel,
        )?;
        Ok(channel)
    }

    pub fn get_server_channels(&self, server_id: i64) -> Result<Vec<Channel>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, server_id, name, type FROM channels WHERE server_id = ?1 ORDER BY id",
        )?;
        let channels = stmt
            .query_map([server_id], row_to_channel)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(channels)
    }

    // -- Messages --

    /// Insert a message, assigning `ts = now`. Returns the new id and ts.
    pub fn add_message(&self, channel_id: i64, author_id: i64, content: &str) -> Result<NewMessage> {
        let ts = now_ts();
        let id = self.conn()?.query_row(
            "INSERT INTO messages (channel_id, author_id, content, ts) VALUES (?1, ?2, ?3, ?4)
             RETURNING id",
            params![channel_id, author_id, content, ts],
            |row| row.get(0),
        )?;
        Ok(NewMessage { id, ts })
    }

    pub fn get_message_by_id(&self, id: i64) -> Result<Option<Message>> {
        let message = self
            .conn()?
            .query_row(
                "SELECT m.id, m.channel_id, m.author_id, u.username, m.content, m.ts
                 FROM messages m JOIN users u ON u.id = m.author_id
                 WHERE m.id = ?1",
                [id],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Conditional update: succeeds only while the requester is the author
    /// and the message is inside the edit window. The condition lives in the
    /// statement itself so the check and the write are atomic.
    pub fn update_message(&self, id: i64, author_id: i64, content: &str) -> Result<bool> {
        let cutoff = now_ts() - EDIT_WINDOW_SECS;
        let changed = self.conn()?.execute(
            "UPDATE messages SET content = ?3
             WHERE id = ?1 AND author_id = ?2 AND ts >= ?4",
            params![id, author_id, content, cutoff],
        )?;
        Ok(changed > 0)
    }

    /// Same conditions as `update_message`.
    pub fn delete_message(&self, id: i64, author_id: i64) -> Result<bool> {
        let cutoff = now_ts() - EDIT_WINDOW_SECS;
        let changed = self.conn()?.execute(
            "DELETE FROM messages WHERE id = ?1 AND author_id = ?2 AND ts >= ?3",
            params![id, author_id, cutoff],
        )?;
        Ok(changed > 0)
    }

    /// Newest first; callers wanting chronological order reverse the page.
    pub fn get_messages(&self, channel_id: i64, limit: u32) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.channel_id, m.author_id, u.username, m.content, m.ts
             FROM messages m JOIN users u ON u.id = m.author_id
             WHERE m.channel_id = ?1 ORDER BY m.id DESC LIMIT ?2",
        )?;
        let messages = stmt
            .query_map(params![channel_id, limit], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        server_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        author_id: row.get(2)?,
        author: row.get(3)?,
        content: row.get(4)?,
        ts: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_SERVER_ID;
    use tempfile::TempDir;

    fn open_test_db() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn seed_creates_default_server_and_channel() {
        let (db, _dir) = open_test_db();

        let user = db.create_user("alice", "salt:hash").unwrap();
        db.add_membership(user.id, DEFAULT_SERVER_ID).unwrap();

        let servers = db.get_user_servers(user.id).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id, 1);
        assert_eq!(servers[0].name, "NoriChat HQ");
        assert_eq!(servers[0].owner_id, 0);

        let channels = db.get_server_channels(DEFAULT_SERVER_ID).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "general");
        assert_eq!(channels[0].kind, "text");
    }

    #[test]
    fn reopening_keeps_the_schema_and_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_user("alice", "salt:hash").unwrap();
        }
        // Second open must not re-run the seed or clobber existing rows.
        let db = Database::open(&path).unwrap();
        assert!(db.find_user_by_username("alice").unwrap().is_some());
        assert_eq!(db.get_server_channels(DEFAULT_SERVER_ID).unwrap().len(), 1);
    }

    #[test]
    fn first_registered_user_gets_id_two() {
        let (db, _dir) = open_test_db();
        let alice = db.create_user("alice", "salt:hash").unwrap();
        assert_eq!(alice.id, 2);
        let bob = db.create_user("bob", "salt:hash").unwrap();
        assert_eq!(bob.id, 3);
    }

    #[test]
    fn reserved_user_cannot_collide_with_registrations() {
        let (db, _dir) = open_test_db();
        // The reserved row exists and owns the name.
        let reserved = db.find_user_by_id(1).unwrap().unwrap();
        assert_eq!(reserved.username, "norichat");
        assert!(db.create_user("norichat", "salt:hash").is_err());
    }

    #[test]
    fn duplicate_usernames_are_rejected() {
        let (db, _dir) = open_test_db();
        db.create_user("alice", "salt:hash").unwrap();
        assert!(db.create_user("alice", "other").is_err());
    }

    #[test]
    fn membership_is_idempotent() {
        let (db, _dir) = open_test_db();
        let user = db.create_user("alice", "salt:hash").unwrap();
        db.add_membership(user.id, DEFAULT_SERVER_ID).unwrap();
        db.add_membership(user.id, DEFAULT_SERVER_ID).unwrap();
        assert!(db.has_membership(user.id, DEFAULT_SERVER_ID).unwrap());
        assert_eq!(db.get_server_members(DEFAULT_SERVER_ID).unwrap().len(), 1);
    }

    #[test]
    fn created_servers_gate_membership() {
        let (db, _dir) = open_test_db();
        let user = db.create_user("alice", "salt:hash").unwrap();
        let server = db.create_server("Second", user.id).unwrap();
        assert_eq!(server.id, 2);
        assert!(!db.has_membership(user.id, server.id).unwrap());
        db.add_membership(user.id, server.id).unwrap();
        assert!(db.has_membership(user.id, server.id).unwrap());
    }

    #[test]
    fn messages_page_newest_first_with_limit() {
        let (db, _dir) = open_test_db();
        let user = db.create_user("alice", "salt:hash").unwrap();

        let mut ids = Vec::new();
        for i in 0..5 {
            let m = db.add_message(1, user.id, &format!("msg {i}")).unwrap();
            ids.push(m.id);
        }
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let page = db.get_messages(1, 3).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].id, ids[4]);
        assert_eq!(page[2].id, ids[2]);
        assert_eq!(page[0].author, "alice");
    }

    #[test]
    fn edit_requires_author() {
        let (db, _dir) = open_test_db();
        let alice = db.create_user("alice", "salt:hash").unwrap();
        let bob = db.create_user("bob", "salt:hash").unwrap();

        let m = db.add_message(1, alice.id, "original").unwrap();
        assert!(!db.update_message(m.id, bob.id, "hijacked").unwrap());
        assert!(db.update_message(m.id, alice.id, "edited").unwrap());

        let stored = db.get_message_by_id(m.id).unwrap().unwrap();
        assert_eq!(stored.content, "edited");
    }

    #[test]
    fn edit_window_expires_after_seven_days() {
        let (db, _dir) = open_test_db();
        let alice = db.create_user("alice", "salt:hash").unwrap();
        let m = db.add_message(1, alice.id, "old news").unwrap();

        // Backdate the message past the window.
        let stale = now_ts() - EDIT_WINDOW_SECS - 60;
        db.conn()
            .unwrap()
            .execute(
                "UPDATE messages SET ts = ?1 WHERE id = ?2",
                params![stale, m.id],
            )
            .unwrap();

        assert!(!db.update_message(m.id, alice.id, "too late").unwrap());
        assert!(!db.delete_message(m.id, alice.id).unwrap());
        assert!(db.get_message_by_id(m.id).unwrap().is_some());
    }

    #[test]
    fn delete_requires_author_and_removes_row() {
        let (db, _dir) = open_test_db();
        let alice = db.create_user("alice", "salt:hash").unwrap();
        let bob = db.create_user("bob", "salt:hash").unwrap();

        let m = db.add_message(1, alice.id, "going away").unwrap();
        assert!(!db.delete_message(m.id, bob.id).unwrap());
        assert!(db.delete_message(m.id, alice.id).unwrap());
        assert!(db.get_message_by_id(m.id).unwrap().is_none());
    }
}
