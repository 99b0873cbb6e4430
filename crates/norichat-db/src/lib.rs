//! SQLite persistence: users, servers, channels, memberships, messages.

pub mod models;
pub mod queries;
mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// The seeded server every registered user auto-joins.
pub const DEFAULT_SERVER_ID: i64 = 1;

/// The store: one SQLite connection shared by the event thread and the HTTP
/// handlers. A `Mutex` (not `RwLock`) because `rusqlite::Connection` is
/// `Send` but not `Sync`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file, apply pending schema upgrades,
    /// and seed the default server on first start. Failure here is fatal to
    /// the caller; nothing else works without the store.
    pub fn open(path: &Path) -> Result<Self> {
        let mut conn = Connection::open(path)
            .with_context(|| format!("cannot open database at {}", path.display()))?;

        // WAL keeps the file crash-safe; messages/memberships reference
        // their parent rows, so enforcement stays on.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        schema::prepare(&mut conn)?;

        info!("store ready at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Every query funnels through here. Statements are single-shot, so the
    /// guard is held only for the duration of one call.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {e}"))
    }
}
