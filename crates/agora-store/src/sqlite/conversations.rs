//! Conversation rows and membership rows.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use agora_shared::Identity;

use crate::error::{Result, StoreError};
use crate::models::{Conversation, ConversationKind, GroupType, PostMode, RequestState};
use crate::store::GroupPatch;

use super::map_constraint;

const COLS: &str = "id, kind, request_state, requester, blocked_by, name, avatar_ref, \
                    group_type, movement_ref, owner, admin_set, post_mode, poster_allowlist, \
                    created_at, updated_at";

pub(super) fn insert(conn: &mut Connection, conversation: &Conversation) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO conversations (id, kind, direct_key, request_state, requester, blocked_by, \
         name, avatar_ref, group_type, movement_ref, owner, admin_set, post_mode, \
         poster_allowlist, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            conversation.id.to_string(),
            conversation.kind.as_str(),
            conversation.direct_key(),
            conversation.request_state.map(RequestState::as_str),
            conversation.requester.as_ref().map(Identity::as_str),
            conversation.blocked_by.as_ref().map(Identity::as_str),
            conversation.name,
            conversation.avatar_ref,
            conversation.group_type.map(GroupType::as_str),
            conversation.movement_ref.map(|m| m.to_string()),
            conversation.owner.as_ref().map(Identity::as_str),
            serde_json::to_string(&conversation.admin_set)?,
            conversation.post_mode.map(PostMode::as_str),
            serde_json::to_string(&conversation.poster_allowlist)?,
            conversation.created_at.to_rfc3339(),
            conversation.updated_at.to_rfc3339(),
        ],
    )
    .map_err(map_constraint)?;

    insert_members(&tx, conversation.id, &conversation.participants)?;

    tx.commit()?;
    Ok(())
}

pub(super) fn get(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLS} FROM conversations WHERE id = ?1"),
            params![id.to_string()],
            row_to_conversation,
        )
        .optional()?;
    attach_participants(conn, row)
}

pub(super) fn find_direct(conn: &Connection, direct_key: &str) -> Result<Option<Conversation>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLS} FROM conversations WHERE direct_key = ?1"),
            params![direct_key],
            row_to_conversation,
        )
        .optional()?;
    attach_participants(conn, row)
}

pub(super) fn list_for(
    conn: &Connection,
    identity: &Identity,
    limit: u32,
    offset: u32,
) -> Result<Vec<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLS} FROM conversations
         WHERE id IN (SELECT conversation_id FROM conversation_members WHERE identity = ?1)
         ORDER BY updated_at DESC, id ASC
         LIMIT ?2 OFFSET ?3"
    ))?;

    let rows = stmt.query_map(
        params![identity.as_str(), limit, offset],
        row_to_conversation,
    )?;

    let mut conversations = Vec::new();
    for row in rows {
        let mut conversation = row?;
        conversation.participants = load_participants(conn, conversation.id)?;
        conversations.push(conversation);
    }
    Ok(conversations)
}

pub(super) fn set_request_state(
    conn: &Connection,
    id: Uuid,
    expected: Option<RequestState>,
    next: RequestState,
    blocked_by: Option<&Identity>,
) -> Result<Conversation> {
    // COALESCE keeps the stored blocked_by when the caller passes none.
    let affected = match expected {
        Some(expected) => conn.execute(
            "UPDATE conversations
             SET request_state = ?1, blocked_by = COALESCE(?2, blocked_by), updated_at = ?3
             WHERE id = ?4 AND kind = 'direct' AND request_state = ?5",
            params![
                next.as_str(),
                blocked_by.map(Identity::as_str),
                Utc::now().to_rfc3339(),
                id.to_string(),
                expected.as_str(),
            ],
        )?,
        None => conn.execute(
            "UPDATE conversations
             SET request_state = ?1, blocked_by = COALESCE(?2, blocked_by), updated_at = ?3
             WHERE id = ?4 AND kind = 'direct'",
            params![
                next.as_str(),
                blocked_by.map(Identity::as_str),
                Utc::now().to_rfc3339(),
                id.to_string(),
            ],
        )?,
    };

    if affected == 0 {
        return match get(conn, id)? {
            Some(_) => Err(StoreError::StateConflict),
            None => Err(StoreError::NotFound),
        };
    }
    get(conn, id)?.ok_or(StoreError::NotFound)
}

pub(super) fn update_group(
    conn: &mut Connection,
    id: Uuid,
    patch: GroupPatch,
) -> Result<Conversation> {
    let tx = conn.transaction()?;

    let row = tx
        .query_row(
            &format!("SELECT {COLS} FROM conversations WHERE id = ?1"),
            params![id.to_string()],
            row_to_conversation,
        )
        .optional()?;
    let mut conversation = match row {
        Some(c) => c,
        None => return Err(StoreError::NotFound),
    };
    conversation.participants = load_participants(&tx, conversation.id)?;

    patch.apply(&mut conversation);

    tx.execute(
        "UPDATE conversations
         SET name = ?1, avatar_ref = ?2, post_mode = ?3, admin_set = ?4,
             poster_allowlist = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            conversation.name,
            conversation.avatar_ref,
            conversation.post_mode.map(PostMode::as_str),
            serde_json::to_string(&conversation.admin_set)?,
            serde_json::to_string(&conversation.poster_allowlist)?,
            conversation.updated_at.to_rfc3339(),
            id.to_string(),
        ],
    )?;

    tx.commit()?;
    Ok(conversation)
}

pub(super) fn set_membership(
    conn: &mut Connection,
    id: Uuid,
    expected_updated_at: DateTime<Utc>,
    participants: BTreeSet<Identity>,
    admin_set: BTreeSet<Identity>,
    poster_allowlist: BTreeSet<Identity>,
) -> Result<Conversation> {
    let tx = conn.transaction()?;

    let affected = tx.execute(
        "UPDATE conversations
         SET admin_set = ?1, poster_allowlist = ?2, updated_at = ?3
         WHERE id = ?4 AND updated_at = ?5",
        params![
            serde_json::to_string(&admin_set)?,
            serde_json::to_string(&poster_allowlist)?,
            Utc::now().to_rfc3339(),
            id.to_string(),
            expected_updated_at.to_rfc3339(),
        ],
    )?;

    if affected == 0 {
        let exists = tx
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        return Err(if exists {
            StoreError::StateConflict
        } else {
            StoreError::NotFound
        });
    }

    tx.execute(
        "DELETE FROM conversation_members WHERE conversation_id = ?1",
        params![id.to_string()],
    )?;
    insert_members(&tx, id, &participants)?;

    tx.commit()?;
    get(conn, id)?.ok_or(StoreError::NotFound)
}

pub(super) fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
    // Members, messages, receipts, and reactions go with it via cascades.
    let affected = conn.execute(
        "DELETE FROM conversations WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(affected > 0)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insert_members(
    conn: &Connection,
    conversation_id: Uuid,
    participants: &BTreeSet<Identity>,
) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO conversation_members (conversation_id, identity) VALUES (?1, ?2)",
    )?;
    for participant in participants {
        stmt.execute(params![conversation_id.to_string(), participant.as_str()])?;
    }
    Ok(())
}

pub(super) fn load_participants(
    conn: &Connection,
    conversation_id: Uuid,
) -> Result<BTreeSet<Identity>> {
    let mut stmt = conn.prepare(
        "SELECT identity FROM conversation_members WHERE conversation_id = ?1",
    )?;
    let rows = stmt.query_map(params![conversation_id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut participants = BTreeSet::new();
    for row in rows {
        let raw = row?;
        let identity = Identity::parse(&raw)
            .map_err(|e| StoreError::Migration(format!("corrupt member handle {raw:?}: {e}")))?;
        participants.insert(identity);
    }
    Ok(participants)
}

fn attach_participants(
    conn: &Connection,
    row: Option<Conversation>,
) -> Result<Option<Conversation>> {
    match row {
        Some(mut conversation) => {
            conversation.participants = load_participants(conn, conversation.id)?;
            Ok(Some(conversation))
        }
        None => Ok(None),
    }
}

/// Map a `rusqlite::Row` to a [`Conversation`] with an empty participant
/// set; the caller attaches members afterwards.
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    fn bad(
        idx: usize,
        e: impl std::error::Error + Send + Sync + 'static,
    ) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    }

    fn bad_enum(idx: usize, value: &str) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown enum value: {value}").into(),
        )
    }

    fn opt_identity(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<Identity>> {
        raw.map(|s| Identity::parse(&s).map_err(|e| bad(idx, e)))
            .transpose()
    }

    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let request_state_str: Option<String> = row.get(2)?;
    let requester_str: Option<String> = row.get(3)?;
    let blocked_by_str: Option<String> = row.get(4)?;
    let name: Option<String> = row.get(5)?;
    let avatar_ref: Option<String> = row.get(6)?;
    let group_type_str: Option<String> = row.get(7)?;
    let movement_ref_str: Option<String> = row.get(8)?;
    let owner_str: Option<String> = row.get(9)?;
    let admin_set_json: String = row.get(10)?;
    let post_mode_str: Option<String> = row.get(11)?;
    let allowlist_json: String = row.get(12)?;
    let created_str: String = row.get(13)?;
    let updated_str: String = row.get(14)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| bad(0, e))?;
    let kind = ConversationKind::parse(&kind_str).ok_or_else(|| bad_enum(1, &kind_str))?;

    let request_state = request_state_str
        .map(|s| RequestState::parse(&s).ok_or_else(|| bad_enum(2, &s)))
        .transpose()?;
    let group_type = group_type_str
        .map(|s| GroupType::parse(&s).ok_or_else(|| bad_enum(7, &s)))
        .transpose()?;
    let post_mode = post_mode_str
        .map(|s| PostMode::parse(&s).ok_or_else(|| bad_enum(11, &s)))
        .transpose()?;

    let movement_ref = movement_ref_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| bad(8, e))?;

    let admin_set: BTreeSet<Identity> =
        serde_json::from_str(&admin_set_json).map_err(|e| bad(10, e))?;
    let poster_allowlist: BTreeSet<Identity> =
        serde_json::from_str(&allowlist_json).map_err(|e| bad(12, e))?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| bad(13, e))?;
    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| bad(14, e))?;

    Ok(Conversation {
        id,
        kind,
        participants: BTreeSet::new(),
        request_state,
        requester: opt_identity(3, requester_str)?,
        blocked_by: opt_identity(4, blocked_by_str)?,
        name,
        avatar_ref,
        group_type,
        movement_ref,
        owner: opt_identity(9, owner_str)?,
        admin_set,
        post_mode,
        poster_allowlist,
        created_at,
        updated_at,
    })
}
