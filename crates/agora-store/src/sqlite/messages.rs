//! Message rows plus their receipt and reaction sets.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use agora_shared::Identity;

use crate::error::{Result, StoreError};
use crate::models::Message;

pub(super) fn append(conn: &mut Connection, message: &Message) -> Result<Message> {
    let tx = conn.transaction()?;

    // Bumping the conversation's recency doubles as the existence check.
    let affected = tx.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        params![
            message.created_at.to_rfc3339(),
            message.conversation_id.to_string()
        ],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }

    tx.execute(
        "INSERT INTO messages (id, conversation_id, sender, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.id.to_string(),
            message.conversation_id.to_string(),
            message.sender.as_str(),
            message.body,
            message.created_at.to_rfc3339(),
        ],
    )?;
    let seq = tx.last_insert_rowid();

    // A fresh message is read by its sender.
    tx.execute(
        "INSERT OR IGNORE INTO receipts (message_id, identity, kind) VALUES (?1, ?2, 'read')",
        params![message.id.to_string(), message.sender.as_str()],
    )?;

    tx.commit()?;

    let mut stored = message.clone();
    stored.seq = seq;
    stored.delivered_to = BTreeSet::new();
    let mut read_by = BTreeSet::new();
    read_by.insert(stored.sender.clone());
    stored.read_by = read_by;
    stored.reactions = BTreeMap::new();
    Ok(stored)
}

pub(super) fn get(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    let row = conn
        .query_row(
            "SELECT seq, id, conversation_id, sender, body, created_at
             FROM messages WHERE id = ?1",
            params![id.to_string()],
            row_to_message,
        )
        .optional()?;

    match row {
        Some(mut message) => {
            fill_tracking(conn, &mut message)?;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

pub(super) fn list(
    conn: &Connection,
    conversation_id: Uuid,
    limit: u32,
    offset: u32,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT seq, id, conversation_id, sender, body, created_at
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY seq DESC
         LIMIT ?2 OFFSET ?3",
    )?;

    let rows = stmt.query_map(
        params![conversation_id.to_string(), limit, offset],
        row_to_message,
    )?;

    let mut messages = Vec::new();
    for row in rows {
        let mut message = row?;
        fill_tracking(conn, &mut message)?;
        messages.push(message);
    }
    Ok(messages)
}

pub(super) fn add_delivery(
    conn: &Connection,
    message_id: Uuid,
    recipient: &Identity,
) -> Result<()> {
    require_message(conn, message_id)?;
    conn.execute(
        "INSERT OR IGNORE INTO receipts (message_id, identity, kind) VALUES (?1, ?2, 'delivered')",
        params![message_id.to_string(), recipient.as_str()],
    )?;
    Ok(())
}

pub(super) fn mark_read(
    conn: &Connection,
    conversation_id: Uuid,
    reader: &Identity,
) -> Result<u64> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM conversations WHERE id = ?1",
            params![conversation_id.to_string()],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Err(StoreError::NotFound);
    }

    // One statement marks the whole conversation; re-running it is a no-op.
    let marked = conn.execute(
        "INSERT OR IGNORE INTO receipts (message_id, identity, kind)
         SELECT id, ?2, 'read' FROM messages
         WHERE conversation_id = ?1 AND sender != ?2",
        params![conversation_id.to_string(), reader.as_str()],
    )?;
    Ok(marked as u64)
}

pub(super) fn toggle_reaction(
    conn: &Connection,
    message_id: Uuid,
    actor: &Identity,
    emoji: &str,
) -> Result<bool> {
    require_message(conn, message_id)?;

    let removed = conn.execute(
        "DELETE FROM reactions WHERE message_id = ?1 AND identity = ?2 AND emoji = ?3",
        params![message_id.to_string(), actor.as_str(), emoji],
    )?;
    if removed > 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT OR IGNORE INTO reactions (message_id, identity, emoji) VALUES (?1, ?2, ?3)",
        params![message_id.to_string(), actor.as_str(), emoji],
    )?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_message(conn: &Connection, message_id: Uuid) -> Result<()> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM messages WHERE id = ?1",
            params![message_id.to_string()],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound)
    }
}

/// Load the receipt and reaction sets for a message.
fn fill_tracking(conn: &Connection, message: &mut Message) -> Result<()> {
    let mut stmt =
        conn.prepare("SELECT identity, kind FROM receipts WHERE message_id = ?1")?;
    let rows = stmt.query_map(params![message.id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    for row in rows {
        let (raw, kind) = row?;
        let identity = parse_identity(&raw)?;
        match kind.as_str() {
            "delivered" => {
                message.delivered_to.insert(identity);
            }
            _ => {
                message.read_by.insert(identity);
            }
        }
    }

    let mut stmt =
        conn.prepare("SELECT emoji, identity FROM reactions WHERE message_id = ?1")?;
    let rows = stmt.query_map(params![message.id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    for row in rows {
        let (emoji, raw) = row?;
        message
            .reactions
            .entry(emoji)
            .or_default()
            .insert(parse_identity(&raw)?);
    }
    Ok(())
}

fn parse_identity(raw: &str) -> Result<Identity> {
    Identity::parse(raw)
        .map_err(|e| StoreError::Migration(format!("corrupt identity handle {raw:?}: {e}")))
}

/// Map a `rusqlite::Row` to a [`Message`] with empty tracking sets.
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    fn bad(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    }

    let seq: i64 = row.get(0)?;
    let id_str: String = row.get(1)?;
    let conversation_id_str: String = row.get(2)?;
    let sender_str: String = row.get(3)?;
    let body: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| bad(1, e))?;
    let conversation_id = Uuid::parse_str(&conversation_id_str).map_err(|e| bad(2, e))?;
    let sender = Identity::parse(&sender_str).map_err(|e| bad(3, e))?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| bad(5, e))?;

    Ok(Message {
        id,
        conversation_id,
        sender,
        body,
        created_at,
        seq,
        delivered_to: BTreeSet::new(),
        read_by: BTreeSet::new(),
        reactions: BTreeMap::new(),
    })
}
