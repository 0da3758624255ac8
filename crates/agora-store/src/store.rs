//! The persistence abstraction both backends implement.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use agora_shared::Identity;

use crate::error::Result;
use crate::models::{BlockEdge, Conversation, Message, PostMode, RequestState};

/// Partial update of a group's profile and posting policy.
///
/// `None` leaves a field untouched; `avatar_ref: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub avatar_ref: Option<Option<String>>,
    pub post_mode: Option<PostMode>,
    pub admin_set: Option<BTreeSet<Identity>>,
    pub poster_allowlist: Option<BTreeSet<Identity>>,
}

impl GroupPatch {
    /// Merge the patch into a conversation.
    ///
    /// Shared by both backends so set repair is identical everywhere: the
    /// owner stays in `admin_set`, and both sets are intersected with the
    /// participant set.
    pub fn apply(&self, conversation: &mut Conversation) {
        if let Some(name) = &self.name {
            conversation.name = Some(name.clone());
        }
        if let Some(avatar_ref) = &self.avatar_ref {
            conversation.avatar_ref = avatar_ref.clone();
        }
        if let Some(post_mode) = self.post_mode {
            conversation.post_mode = Some(post_mode);
        }
        if let Some(admin_set) = &self.admin_set {
            let mut admin_set = admin_set.clone();
            if let Some(owner) = &conversation.owner {
                admin_set.insert(owner.clone());
            }
            admin_set.retain(|a| conversation.participants.contains(a));
            conversation.admin_set = admin_set;
        }
        if let Some(poster_allowlist) = &self.poster_allowlist {
            let mut poster_allowlist = poster_allowlist.clone();
            poster_allowlist.retain(|p| conversation.participants.contains(p));
            conversation.poster_allowlist = poster_allowlist;
        }
        conversation.updated_at = Utc::now();
    }
}

/// The single storage interface for conversations, messages, and block
/// edges.
///
/// Mutations are atomic at the level of one call: set-adds are
/// insert-if-absent, the request-state transition is conditional on the
/// expected current state, and membership replacement is compare-and-swap
/// on `updated_at`.  Callers never do read-modify-write round trips.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    // -- Conversations ----------------------------------------------------

    /// Insert a new conversation.  Fails with [`StoreError::AlreadyExists`]
    /// on a duplicate id or duplicate direct pair.
    ///
    /// [`StoreError::AlreadyExists`]: crate::StoreError::AlreadyExists
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// The at-most-one direct conversation for an unordered identity pair.
    async fn find_direct_between(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Option<Conversation>>;

    /// Conversations the identity participates in, most recently updated
    /// first.
    async fn list_conversations_for(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>>;

    /// Conditional request-state transition for a direct conversation.
    ///
    /// With `expected = Some(s)` the update only applies while the stored
    /// state is `s`; a mismatch is [`StoreError::StateConflict`].  `None`
    /// transitions from any state (used by `block`).  `blocked_by` is
    /// recorded when given, left untouched otherwise.
    ///
    /// [`StoreError::StateConflict`]: crate::StoreError::StateConflict
    async fn set_request_state(
        &self,
        id: Uuid,
        expected: Option<RequestState>,
        next: RequestState,
        blocked_by: Option<&Identity>,
    ) -> Result<Conversation>;

    /// Apply a group profile/policy patch atomically.
    async fn update_group(&self, id: Uuid, patch: GroupPatch) -> Result<Conversation>;

    /// Replace the membership sets, conditional on `updated_at` being
    /// unchanged since the caller loaded the conversation.
    async fn set_membership(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        participants: BTreeSet<Identity>,
        admin_set: BTreeSet<Identity>,
        poster_allowlist: BTreeSet<Identity>,
    ) -> Result<Conversation>;

    /// Hard-delete a conversation and everything under it.  Administrative
    /// purge only; returns `false` when the id was unknown.
    async fn delete_conversation(&self, id: Uuid) -> Result<bool>;

    // -- Messages ---------------------------------------------------------

    /// Append a message, assigning its `seq`, and bump the conversation's
    /// `updated_at` in the same atomic step.  Returns the stored message.
    async fn append_message(&self, message: &Message) -> Result<Message>;

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>>;

    /// A page of messages, newest appended first.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>>;

    /// Add `recipient` to a message's delivered set if absent.
    async fn add_delivery(&self, message_id: Uuid, recipient: &Identity) -> Result<()>;

    /// Conversation-wide read receipt: add `reader` to `read_by` of every
    /// message they did not send.  Idempotent; returns the number of
    /// messages newly marked.
    async fn mark_read(&self, conversation_id: Uuid, reader: &Identity) -> Result<u64>;

    /// Flip `actor`'s membership in `reactions[emoji]`.  Returns whether
    /// the reaction is present after the call.
    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        actor: &Identity,
        emoji: &str,
    ) -> Result<bool>;

    // -- Block edges ------------------------------------------------------

    /// Record a directed block edge if absent.
    async fn put_block(&self, edge: &BlockEdge) -> Result<()>;

    /// Remove the edge `(blocker, blocked)`.  Returns `true` if it existed.
    async fn remove_block(&self, blocker: &Identity, blocked: &Identity) -> Result<bool>;

    /// Every edge the identity appears in, either side.
    async fn edges_involving(&self, identity: &Identity) -> Result<Vec<BlockEdge>>;
}
