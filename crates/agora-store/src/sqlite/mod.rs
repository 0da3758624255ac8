//! Durable SQLite backend.
//!
//! A [`SqliteStore`] owns a single `rusqlite::Connection` behind a tokio
//! mutex and guarantees that migrations run before any other operation.
//! Every operation is one statement or one short transaction, so holding
//! the lock across the synchronous call stays cheap; the server wraps all
//! store calls in a bounded timeout regardless.
//!
//! This is the only backend safe for multiple server instances: set
//! mutations are conditional single statements (`INSERT OR IGNORE`,
//! guarded `UPDATE`), never read-modify-write from the caller.

mod blocks;
mod conversations;
mod messages;
pub mod migrations;

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;
use uuid::Uuid;

use agora_shared::Identity;

use crate::error::{Result, StoreError};
use crate::models::{BlockEdge, Conversation, Message, RequestState};
use crate::store::{ConversationStore, GroupPatch};

/// Durable [`ConversationStore`] backed by SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening conversation database");
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database.  Useful for tests; for an
    /// ephemeral production deployment prefer [`MemoryStore`].
    ///
    /// [`MemoryStore`]: crate::MemoryStore
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Map a uniqueness violation to [`StoreError::AlreadyExists`].
fn map_constraint(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::AlreadyExists
        }
        other => StoreError::Sqlite(other),
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conversations::insert(&mut conn, conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().await;
        conversations::get(&conn, id)
    }

    async fn find_direct_between(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().await;
        conversations::find_direct(&conn, &Conversation::direct_pair_key(a, b))
    }

    async fn list_conversations_for(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock().await;
        conversations::list_for(&conn, identity, limit, offset)
    }

    async fn set_request_state(
        &self,
        id: Uuid,
        expected: Option<RequestState>,
        next: RequestState,
        blocked_by: Option<&Identity>,
    ) -> Result<Conversation> {
        let conn = self.conn.lock().await;
        conversations::set_request_state(&conn, id, expected, next, blocked_by)
    }

    async fn update_group(&self, id: Uuid, patch: GroupPatch) -> Result<Conversation> {
        let mut conn = self.conn.lock().await;
        conversations::update_group(&mut conn, id, patch)
    }

    async fn set_membership(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        participants: BTreeSet<Identity>,
        admin_set: BTreeSet<Identity>,
        poster_allowlist: BTreeSet<Identity>,
    ) -> Result<Conversation> {
        let mut conn = self.conn.lock().await;
        conversations::set_membership(
            &mut conn,
            id,
            expected_updated_at,
            participants,
            admin_set,
            poster_allowlist,
        )
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().await;
        conversations::delete(&conn, id)
    }

    async fn append_message(&self, message: &Message) -> Result<Message> {
        let mut conn = self.conn.lock().await;
        messages::append(&mut conn, message)
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        let conn = self.conn.lock().await;
        messages::get(&conn, id)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let conn = self.conn.lock().await;
        messages::list(&conn, conversation_id, limit, offset)
    }

    async fn add_delivery(&self, message_id: Uuid, recipient: &Identity) -> Result<()> {
        let conn = self.conn.lock().await;
        messages::add_delivery(&conn, message_id, recipient)
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: &Identity) -> Result<u64> {
        let conn = self.conn.lock().await;
        messages::mark_read(&conn, conversation_id, reader)
    }

    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        actor: &Identity,
        emoji: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        messages::toggle_reaction(&conn, message_id, actor, emoji)
    }

    async fn put_block(&self, edge: &BlockEdge) -> Result<()> {
        let conn = self.conn.lock().await;
        blocks::put(&conn, edge)
    }

    async fn remove_block(&self, blocker: &Identity, blocked: &Identity) -> Result<bool> {
        let conn = self.conn.lock().await;
        blocks::remove(&conn, blocker, blocked)
    }

    async fn edges_involving(&self, identity: &Identity) -> Result<Vec<BlockEdge>> {
        let conn = self.conn.lock().await;
        blocks::involving(&conn, identity)
    }
}
