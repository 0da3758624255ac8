//! Ephemeral in-process backend.
//!
//! Everything lives in maps behind one `RwLock`; a single write lock per
//! mutation gives the same atomicity the durable backend gets from
//! single-statement conditional updates.  Explicitly single-process: not
//! safe for horizontal scale-out, intended for tests and ephemeral
//! deployments.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use agora_shared::Identity;

use crate::error::{Result, StoreError};
use crate::models::{BlockEdge, Conversation, Message, RequestState};
use crate::store::{ConversationStore, GroupPatch};

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    /// Unordered-pair key -> direct conversation id.
    direct_index: HashMap<String, Uuid>,
    messages: HashMap<Uuid, Message>,
    /// Conversation id -> message ids in append order.
    order: HashMap<Uuid, Vec<Uuid>>,
    blocks: HashMap<(Identity, Identity), DateTime<Utc>>,
    next_seq: i64,
}

/// In-memory [`ConversationStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut inner = self.inner.write().await;

        if inner.conversations.contains_key(&conversation.id) {
            return Err(StoreError::AlreadyExists);
        }
        if let Some(key) = conversation.direct_key() {
            if inner.direct_index.contains_key(&key) {
                return Err(StoreError::AlreadyExists);
            }
            inner.direct_index.insert(key, conversation.id);
        }

        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        inner.order.insert(conversation.id, Vec::new());
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let inner = self.inner.read().await;
        Ok(inner.conversations.get(&id).cloned())
    }

    async fn find_direct_between(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Option<Conversation>> {
        let inner = self.inner.read().await;
        let key = Conversation::direct_pair_key(a, b);
        Ok(inner
            .direct_index
            .get(&key)
            .and_then(|id| inner.conversations.get(id))
            .cloned())
    }

    async fn list_conversations_for(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>> {
        let inner = self.inner.read().await;

        let mut hits: Vec<&Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.participants.contains(identity))
            .collect();
        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));

        Ok(hits
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn set_request_state(
        &self,
        id: Uuid,
        expected: Option<RequestState>,
        next: RequestState,
        blocked_by: Option<&Identity>,
    ) -> Result<Conversation> {
        let mut inner = self.inner.write().await;

        let conv = inner
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        if !conv.is_direct() {
            return Err(StoreError::StateConflict);
        }
        if let Some(expected) = expected {
            if conv.request_state != Some(expected) {
                return Err(StoreError::StateConflict);
            }
        }

        conv.request_state = Some(next);
        if let Some(by) = blocked_by {
            conv.blocked_by = Some(by.clone());
        }
        conv.updated_at = Utc::now();
        Ok(conv.clone())
    }

    async fn update_group(&self, id: Uuid, patch: GroupPatch) -> Result<Conversation> {
        let mut inner = self.inner.write().await;

        let conv = inner
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        patch.apply(conv);
        Ok(conv.clone())
    }

    async fn set_membership(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        participants: BTreeSet<Identity>,
        admin_set: BTreeSet<Identity>,
        poster_allowlist: BTreeSet<Identity>,
    ) -> Result<Conversation> {
        let mut inner = self.inner.write().await;

        let conv = inner
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        if conv.updated_at != expected_updated_at {
            return Err(StoreError::StateConflict);
        }

        conv.participants = participants;
        conv.admin_set = admin_set;
        conv.poster_allowlist = poster_allowlist;
        conv.updated_at = Utc::now();
        Ok(conv.clone())
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;

        let Some(conv) = inner.conversations.remove(&id) else {
            return Ok(false);
        };
        if let Some(key) = conv.direct_key() {
            inner.direct_index.remove(&key);
        }
        if let Some(ids) = inner.order.remove(&id) {
            for message_id in ids {
                inner.messages.remove(&message_id);
            }
        }
        Ok(true)
    }

    async fn append_message(&self, message: &Message) -> Result<Message> {
        let mut inner = self.inner.write().await;

        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound);
        }

        inner.next_seq += 1;
        let mut stored = message.clone();
        stored.seq = inner.next_seq;

        inner
            .order
            .entry(stored.conversation_id)
            .or_default()
            .push(stored.id);
        inner.messages.insert(stored.id, stored.clone());

        if let Some(conv) = inner.conversations.get_mut(&stored.conversation_id) {
            conv.updated_at = stored.created_at;
        }
        Ok(stored)
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(&id).cloned())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;

        let Some(order) = inner.order.get(&conversation_id) else {
            return Ok(Vec::new());
        };
        Ok(order
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|id| inner.messages.get(id))
            .cloned()
            .collect())
    }

    async fn add_delivery(&self, message_id: Uuid, recipient: &Identity) -> Result<()> {
        let mut inner = self.inner.write().await;

        let message = inner
            .messages
            .get_mut(&message_id)
            .ok_or(StoreError::NotFound)?;
        message.delivered_to.insert(recipient.clone());
        Ok(())
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: &Identity) -> Result<u64> {
        let mut inner = self.inner.write().await;

        if !inner.conversations.contains_key(&conversation_id) {
            return Err(StoreError::NotFound);
        }

        let ids = inner.order.get(&conversation_id).cloned().unwrap_or_default();
        let mut newly_marked = 0;
        for id in ids {
            if let Some(message) = inner.messages.get_mut(&id) {
                if message.sender != *reader && message.read_by.insert(reader.clone()) {
                    newly_marked += 1;
                }
            }
        }
        Ok(newly_marked)
    }

    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        actor: &Identity,
        emoji: &str,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;

        let message = inner
            .messages
            .get_mut(&message_id)
            .ok_or(StoreError::NotFound)?;

        let set = message.reactions.entry(emoji.to_string()).or_default();
        let now_present = if set.contains(actor) {
            set.remove(actor);
            false
        } else {
            set.insert(actor.clone());
            true
        };
        if set.is_empty() {
            message.reactions.remove(emoji);
        }
        Ok(now_present)
    }

    async fn put_block(&self, edge: &BlockEdge) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .blocks
            .entry((edge.blocker.clone(), edge.blocked.clone()))
            .or_insert(edge.created_at);
        Ok(())
    }

    async fn remove_block(&self, blocker: &Identity, blocked: &Identity) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .blocks
            .remove(&(blocker.clone(), blocked.clone()))
            .is_some())
    }

    async fn edges_involving(&self, identity: &Identity) -> Result<Vec<BlockEdge>> {
        let inner = self.inner.read().await;
        Ok(inner
            .blocks
            .iter()
            .filter(|((blocker, blocked), _)| blocker == identity || blocked == identity)
            .map(|((blocker, blocked), created_at)| BlockEdge {
                blocker: blocker.clone(),
                blocked: blocked.clone(),
                created_at: *created_at,
            })
            .collect())
    }
}
