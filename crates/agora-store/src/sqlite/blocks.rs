//! Block-edge rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use agora_shared::Identity;

use crate::error::{Result, StoreError};
use crate::models::BlockEdge;

pub(super) fn put(conn: &Connection, edge: &BlockEdge) -> Result<()> {
    // Re-blocking keeps the original edge timestamp.
    conn.execute(
        "INSERT OR IGNORE INTO blocks (blocker, blocked, created_at) VALUES (?1, ?2, ?3)",
        params![
            edge.blocker.as_str(),
            edge.blocked.as_str(),
            edge.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(super) fn remove(conn: &Connection, blocker: &Identity, blocked: &Identity) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM blocks WHERE blocker = ?1 AND blocked = ?2",
        params![blocker.as_str(), blocked.as_str()],
    )?;
    Ok(affected > 0)
}

pub(super) fn involving(conn: &Connection, identity: &Identity) -> Result<Vec<BlockEdge>> {
    let mut stmt = conn.prepare(
        "SELECT blocker, blocked, created_at FROM blocks WHERE blocker = ?1 OR blocked = ?1",
    )?;

    let rows = stmt.query_map(params![identity.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut edges = Vec::new();
    for row in rows {
        let (blocker, blocked, created) = row?;
        edges.push(BlockEdge {
            blocker: parse_identity(&blocker)?,
            blocked: parse_identity(&blocked)?,
            created_at: DateTime::parse_from_rfc3339(&created)
                .map(|dt| dt.with_timezone(&Utc))?,
        });
    }
    Ok(edges)
}

fn parse_identity(raw: &str) -> Result<Identity> {
    Identity::parse(raw)
        .map_err(|e| StoreError::Migration(format!("corrupt identity handle {raw:?}: {e}")))
}
