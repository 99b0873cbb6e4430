//! Schema creation and upgrades.
//!
//! The installed generation lives in SQLite's `user_version` pragma. Each
//! upgrade step runs in one IMMEDIATE transaction and bumps the pragma on
//! commit; an interrupted step rolls back wholesale when the transaction
//! drops.

use anyhow::{anyhow, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

const SCHEMA_VERSION: i64 = 1;

pub(crate) fn prepare(conn: &mut Connection) -> Result<()> {
    let mut version = installed_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(anyhow!(
            "database schema v{version} is newer than this build supports (v{SCHEMA_VERSION})"
        ));
    }

    while version < SCHEMA_VERSION {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match version {
            0 => create_base_schema(&tx)?,
            v => return Err(anyhow!("no upgrade path from schema v{v}")),
        }
        version += 1;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        info!("schema now at v{version}");
    }

    Ok(())
}

fn installed_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// v0 → v1: the five tables, plus seed rows.
///
/// Seeds the default server with its #general channel, and a reserved user
/// row holding id 1. The reserved row keeps real account ids starting at 2
/// and can never log in: its stored hash has no salt separator, so password
/// verification always fails.
fn create_base_schema(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "
        CREATE TABLE users (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            username      TEXT    NOT NULL UNIQUE,
            password_hash TEXT    NOT NULL,
            created_at    INTEGER NOT NULL
        );

        CREATE TABLE servers (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            name     TEXT    NOT NULL,
            owner_id INTEGER NOT NULL
        );

        CREATE TABLE channels (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id INTEGER NOT NULL REFERENCES servers(id),
            name      TEXT    NOT NULL,
            type      TEXT    NOT NULL DEFAULT 'text'
        );

        CREATE TABLE messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id INTEGER NOT NULL REFERENCES channels(id),
            author_id  INTEGER NOT NULL REFERENCES users(id),
            content    TEXT    NOT NULL,
            ts         INTEGER NOT NULL
        );

        CREATE INDEX idx_messages_channel ON messages(channel_id, id);

        CREATE TABLE memberships (
            user_id   INTEGER NOT NULL REFERENCES users(id),
            server_id INTEGER NOT NULL REFERENCES servers(id),
            PRIMARY KEY (user_id, server_id)
        );

        INSERT INTO users (id, username, password_hash, created_at)
            VALUES (1, 'norichat', '!', strftime('%s', 'now'));

        INSERT INTO servers (id, name, owner_id)
            VALUES (1, 'NoriChat HQ', 0);

        INSERT INTO channels (server_id, name, type)
            VALUES (1, 'general', 'text');
        ",
    )?;
    Ok(())
}
