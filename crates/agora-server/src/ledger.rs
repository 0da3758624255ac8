//! The message ledger: append, delivery/read receipts, reactions, and the
//! block-filtered read view.
//!
//! Permission checks always run before any write, so a rejected call leaves
//! no partial state.  Receipt frames are background traffic: when their
//! preconditions fail they are silently dropped rather than errored, which
//! also avoids leaking block state over the socket.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use agora_shared::content::{prepare_body, valid_emoji};
use agora_store::{Conversation, ConversationKind, ConversationStore, Message};

use crate::blocklist::Visibility;
use crate::conversations::{can_send, screen};
use crate::error::{bounded, ApiError};
use crate::groups::can_post;

#[derive(Clone)]
pub struct MessageLedger {
    store: Arc<dyn ConversationStore>,
    ops_timeout: Duration,
}

impl MessageLedger {
    pub fn new(store: Arc<dyn ConversationStore>, ops_timeout: Duration) -> Self {
        Self { store, ops_timeout }
    }

    /// Append a message on behalf of the viewer.
    ///
    /// Ciphertext-marked bodies are stored byte-exact; plaintext is
    /// trimmed, bounded, and screened.  Returns the conversation (with its
    /// bumped recency) and the stored message.
    pub async fn append(
        &self,
        vis: &Visibility,
        conversation_id: Uuid,
        raw_body: &str,
    ) -> Result<(Conversation, Message), ApiError> {
        let mut conversation = self.require_visible(vis, conversation_id).await?;
        let sender = vis.viewer();

        match conversation.kind {
            ConversationKind::Direct => {
                if let Some(peer) = conversation.direct_peer(sender) {
                    if vis.blocked_by_viewer(peer) {
                        return Err(ApiError::PermissionDenied(
                            "interaction with a blocked identity".into(),
                        ));
                    }
                }
                if !can_send(&conversation, sender) {
                    return Err(ApiError::PermissionDenied(
                        "this conversation is not accepting your messages".into(),
                    ));
                }
            }
            ConversationKind::Group => {
                if !can_post(&conversation, sender) {
                    return Err(ApiError::PermissionDenied(
                        "posting is restricted in this group".into(),
                    ));
                }
            }
        }

        let body = prepare_body(raw_body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let message = Message::new(conversation.id, sender.clone(), body);
        let stored = bounded(self.ops_timeout, self.store.append_message(&message)).await?;

        conversation.updated_at = stored.created_at;
        Ok((conversation, stored))
    }

    /// Per-recipient delivery receipt.  A no-op (not an error) unless the
    /// receipt makes sense: recipient is a participant, is not the sender,
    /// and the pair is not block-suppressed.
    pub async fn mark_delivered(
        &self,
        vis: &Visibility,
        message_id: Uuid,
    ) -> Result<Option<(Conversation, Message)>, ApiError> {
        let Some(mut message) = bounded(self.ops_timeout, self.store.get_message(message_id)).await?
        else {
            return Ok(None);
        };
        let Some(conversation) = bounded(
            self.ops_timeout,
            self.store.get_conversation(message.conversation_id),
        )
        .await?
        else {
            return Ok(None);
        };

        let recipient = vis.viewer();
        if !conversation.is_participant(recipient)
            || message.sender == *recipient
            || vis.suppressed(&message.sender)
        {
            return Ok(None);
        }

        bounded(self.ops_timeout, self.store.add_delivery(message.id, recipient)).await?;
        message.delivered_to.insert(recipient.clone());
        Ok(Some((conversation, message)))
    }

    /// Conversation-wide read receipt.  Idempotent; a no-op for viewers the
    /// conversation is invisible to.
    pub async fn mark_read(
        &self,
        vis: &Visibility,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, ApiError> {
        let Some(conversation) = bounded(
            self.ops_timeout,
            self.store.get_conversation(conversation_id),
        )
        .await?
        else {
            return Ok(None);
        };
        if screen(&conversation, vis).is_err() {
            return Ok(None);
        }

        let marked = bounded(
            self.ops_timeout,
            self.store.mark_read(conversation.id, vis.viewer()),
        )
        .await?;
        debug!(conversation = %conversation.id, reader = %vis.viewer(), marked, "conversation read");
        Ok(Some(conversation))
    }

    /// Flip the viewer's reaction on a message.  Returns the refreshed
    /// message and whether the reaction is now present.
    pub async fn toggle_reaction(
        &self,
        vis: &Visibility,
        message_id: Uuid,
        emoji: &str,
    ) -> Result<(Conversation, Message, bool), ApiError> {
        if !valid_emoji(emoji) {
            return Err(ApiError::InvalidRequest("invalid reaction emoji".into()));
        }

        let message = bounded(self.ops_timeout, self.store.get_message(message_id))
            .await?
            .ok_or_else(|| ApiError::NotFound("message not found".into()))?;
        let conversation = self.require_visible(vis, message.conversation_id).await?;

        if vis.suppressed(&message.sender) {
            if vis.blocked_by_viewer(&message.sender) {
                return Err(ApiError::PermissionDenied(
                    "interaction with a blocked identity".into(),
                ));
            }
            // The sender blocked the viewer; their messages do not exist
            // in the viewer's world.
            return Err(ApiError::NotFound("message not found".into()));
        }

        let present = bounded(
            self.ops_timeout,
            self.store.toggle_reaction(message.id, vis.viewer(), emoji),
        )
        .await?;
        let refreshed = bounded(self.ops_timeout, self.store.get_message(message.id))
            .await?
            .ok_or_else(|| ApiError::NotFound("message not found".into()))?;
        Ok((conversation, refreshed, present))
    }

    /// A page of messages, newest first, with block-suppressed senders
    /// filtered from the view.  The ledger itself is untouched, so lifting
    /// a block later reveals the same history.
    pub async fn page(
        &self,
        vis: &Visibility,
        conversation_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ApiError> {
        let conversation = self.require_visible(vis, conversation_id).await?;
        let messages = bounded(
            self.ops_timeout,
            self.store.list_messages(conversation.id, limit, offset),
        )
        .await?;
        Ok(messages
            .into_iter()
            .filter(|m| !vis.suppressed(&m.sender))
            .collect())
    }

    async fn require_visible(
        &self,
        vis: &Visibility,
        conversation_id: Uuid,
    ) -> Result<Conversation, ApiError> {
        let conversation = bounded(
            self.ops_timeout,
            self.store.get_conversation(conversation_id),
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;
        screen(&conversation, vis)?;
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_shared::content::CIPHERTEXT_MARKER;
    use crate::testutil::{handle, TestEnv};
    use agora_store::PostMode;

    #[tokio::test]
    async fn round_trip_returns_fresh_tracking_sets() {
        let env = TestEnv::new().await;
        let conv = env.accepted_direct("alice", "bob").await;

        let vis = env.vis("alice").await;
        let (_, sent) = env.ledger.append(&vis, conv.id, "hi").await.unwrap();

        let page = env.ledger.page(&vis, conv.id, 10, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, sent.id);
        assert_eq!(page[0].read_by, [handle("alice")].into_iter().collect());
        assert!(page[0].delivered_to.is_empty());
        assert!(page[0].reactions.is_empty());
    }

    #[tokio::test]
    async fn request_accept_message_read_flow() {
        let env = TestEnv::new().await;
        // alice does not follow bob: first contact is pending.
        let conv = env.direct("alice", "bob").await;
        assert_eq!(conv.requester, Some(handle("alice")));

        env.conversations
            .accept(&env.vis("bob").await, conv.id)
            .await
            .unwrap();

        let (_, sent) = env
            .ledger
            .append(&env.vis("alice").await, conv.id, "hi")
            .await
            .unwrap();

        // Visible to bob.
        let bob_vis = env.vis("bob").await;
        let page = env.ledger.page(&bob_vis, conv.id, 10, 0).await.unwrap();
        assert_eq!(page[0].id, sent.id);

        // Bob reads the conversation.
        env.ledger.mark_read(&bob_vis, conv.id).await.unwrap();
        let page = env.ledger.page(&bob_vis, conv.id, 10, 0).await.unwrap();
        assert!(page[0].read_by.contains(&handle("bob")));
    }

    #[tokio::test]
    async fn pending_blocks_everyone_but_the_requester() {
        let env = TestEnv::new().await;
        let conv = env.direct("alice", "bob").await;

        // The requester may keep writing into a pending thread.
        assert!(env
            .ledger
            .append(&env.vis("alice").await, conv.id, "hello?")
            .await
            .is_ok());

        assert!(matches!(
            env.ledger
                .append(&env.vis("bob").await, conv.id, "not yet")
                .await,
            Err(ApiError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn declined_requests_stay_closed() {
        let env = TestEnv::new().await;
        let conv = env.direct("alice", "bob").await;
        env.conversations
            .decline(&env.vis("bob").await, conv.id)
            .await
            .unwrap();

        assert!(matches!(
            env.ledger
                .append(&env.vis("alice").await, conv.id, "please?")
                .await,
            Err(ApiError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn block_hides_history_without_deleting_it() {
        let env = TestEnv::new().await;
        let conv = env.accepted_direct("alice", "bob").await;

        let (_, from_bob) = env
            .ledger
            .append(&env.vis("bob").await, conv.id, "hey")
            .await
            .unwrap();

        env.blocks
            .block(&handle("alice"), &handle("bob"))
            .await
            .unwrap();

        // The blocked party's world: the thread is gone.
        assert!(matches!(
            env.ledger
                .append(&env.vis("bob").await, conv.id, "still there?")
                .await,
            Err(ApiError::NotFound(_))
        ));

        // The blocker's world: the thread exists but the interaction and
        // the peer's history are suppressed.
        let alice_vis = env.vis("alice").await;
        assert!(matches!(
            env.ledger.append(&alice_vis, conv.id, "hi").await,
            Err(ApiError::PermissionDenied(_))
        ));
        let page = env.ledger.page(&alice_vis, conv.id, 10, 0).await.unwrap();
        assert!(page.is_empty());

        // The ledger kept the message; unblocking reveals the same entry.
        assert!(env.store.get_message(from_bob.id).await.unwrap().is_some());
        env.blocks
            .unblock(&handle("alice"), &handle("bob"))
            .await
            .unwrap();
        let page = env
            .ledger
            .page(&env.vis("alice").await, conv.id, 10, 0)
            .await
            .unwrap();
        assert_eq!(page[0].id, from_bob.id);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let env = TestEnv::new().await;
        let conv = env.accepted_direct("alice", "bob").await;
        env.ledger
            .append(&env.vis("alice").await, conv.id, "one")
            .await
            .unwrap();

        let bob_vis = env.vis("bob").await;
        env.ledger.mark_read(&bob_vis, conv.id).await.unwrap();
        let first: Vec<_> = env.ledger.page(&bob_vis, conv.id, 10, 0).await.unwrap();
        env.ledger.mark_read(&bob_vis, conv.id).await.unwrap();
        let second: Vec<_> = env.ledger.page(&bob_vis, conv.id, 10, 0).await.unwrap();

        assert_eq!(
            first.iter().map(|m| &m.read_by).collect::<Vec<_>>(),
            second.iter().map(|m| &m.read_by).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn toggle_reaction_is_an_involution() {
        let env = TestEnv::new().await;
        let conv = env.accepted_direct("alice", "bob").await;
        let (_, msg) = env
            .ledger
            .append(&env.vis("alice").await, conv.id, "react to this")
            .await
            .unwrap();

        let bob_vis = env.vis("bob").await;
        let (_, with, present) = env
            .ledger
            .toggle_reaction(&bob_vis, msg.id, "👍")
            .await
            .unwrap();
        assert!(present);
        assert!(with.reactions.contains_key("👍"));

        let (_, without, present) = env
            .ledger
            .toggle_reaction(&bob_vis, msg.id, "👍")
            .await
            .unwrap();
        assert!(!present);
        assert_eq!(without.reactions, msg.reactions);

        assert!(matches!(
            env.ledger.toggle_reaction(&bob_vis, msg.id, "not an emoji").await,
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn ciphertext_bodies_are_stored_byte_exact() {
        let env = TestEnv::new().await;
        let conv = env.accepted_direct("alice", "bob").await;

        let body = format!("{CIPHERTEXT_MARKER}  j8F/x9==\n\n padded ");
        let (_, sent) = env
            .ledger
            .append(&env.vis("alice").await, conv.id, &body)
            .await
            .unwrap();
        assert_eq!(sent.body, body);

        let stored = env.store.get_message(sent.id).await.unwrap().unwrap();
        assert_eq!(stored.body, body);
    }

    #[tokio::test]
    async fn oversized_plaintext_is_rejected_before_any_write() {
        let env = TestEnv::new().await;
        let conv = env.accepted_direct("alice", "bob").await;
        let vis = env.vis("alice").await;

        let result = env
            .ledger
            .append(&vis, conv.id, &"x".repeat(5000))
            .await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert!(env.ledger.page(&vis, conv.id, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_receipts_are_silent_no_ops_when_invalid() {
        let env = TestEnv::new().await;
        let conv = env.accepted_direct("alice", "bob").await;
        let (_, msg) = env
            .ledger
            .append(&env.vis("alice").await, conv.id, "hi")
            .await
            .unwrap();

        // Sender acking their own message: no-op.
        assert!(env
            .ledger
            .mark_delivered(&env.vis("alice").await, msg.id)
            .await
            .unwrap()
            .is_none());
        // Outsider: no-op.
        assert!(env
            .ledger
            .mark_delivered(&env.vis("mallory").await, msg.id)
            .await
            .unwrap()
            .is_none());
        // Unknown message: no-op.
        assert!(env
            .ledger
            .mark_delivered(&env.vis("bob").await, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());

        // The real recipient: recorded, idempotently.
        let (_, updated) = env
            .ledger
            .mark_delivered(&env.vis("bob").await, msg.id)
            .await
            .unwrap()
            .unwrap();
        assert!(updated.delivered_to.contains(&handle("bob")));
    }

    #[tokio::test]
    async fn group_posting_policy_gates_append() {
        let env = TestEnv::new().await;
        let conv = env.group("owner", &["x", "y"], PostMode::Admins).await;

        assert!(matches!(
            env.ledger
                .append(&env.vis("x").await, conv.id, "hello")
                .await,
            Err(ApiError::PermissionDenied(_))
        ));
        assert!(env
            .ledger
            .append(&env.vis("owner").await, conv.id, "welcome")
            .await
            .is_ok());
    }
}
