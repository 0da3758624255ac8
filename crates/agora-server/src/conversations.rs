//! Direct-conversation lifecycle: lazy creation and the
//! pending/accepted/declined/blocked state machine.
//!
//! The governing visibility rule: a blocked party's view of a conversation
//! is indistinguishable from non-existence.  Screening therefore answers
//! `NotFound`, never `PermissionDenied`, whenever the viewer is on the
//! receiving end of a block; `PermissionDenied` is reserved for violations
//! the viewer is allowed to know about.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use agora_shared::Identity;
use agora_store::{Conversation, ConversationStore, RequestState};

use crate::blocklist::{BlockRegistry, Visibility};
use crate::directory::PlatformDirectory;
use crate::error::{bounded, ApiError};

fn not_found() -> ApiError {
    ApiError::NotFound("conversation not found".into())
}

/// The send-permission rule for direct conversations: accepted threads are
/// open, pending ones only to the requester, declined and blocked to
/// nobody.
pub fn can_send(conversation: &Conversation, sender: &Identity) -> bool {
    match conversation.request_state {
        Some(RequestState::Accepted) => true,
        Some(RequestState::Pending) => conversation.requester.as_ref() == Some(sender),
        _ => false,
    }
}

/// Reject views a viewer must not have: non-participants, and blocked
/// parties of a direct thread (who get `NotFound`, not a permission
/// error).
pub fn screen(conversation: &Conversation, vis: &Visibility) -> Result<(), ApiError> {
    if !conversation.is_participant(vis.viewer()) {
        return Err(not_found());
    }
    if let Some(peer) = conversation.direct_peer(vis.viewer()) {
        if vis.suppressed(peer) && !vis.blocked_by_viewer(peer) {
            return Err(not_found());
        }
    }
    Ok(())
}

/// Direct-conversation service.
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    blocks: BlockRegistry,
    directory: PlatformDirectory,
    ops_timeout: Duration,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        blocks: BlockRegistry,
        directory: PlatformDirectory,
        ops_timeout: Duration,
    ) -> Self {
        Self {
            store,
            blocks,
            directory,
            ops_timeout,
        }
    }

    /// First contact between two identities: create the direct thread
    /// lazily, or return the existing one.  The boolean reports whether
    /// this call created it.
    pub async fn open_direct(
        &self,
        vis: &Visibility,
        peer: &Identity,
    ) -> Result<(Conversation, bool), ApiError> {
        let requester = vis.viewer();
        if requester == peer {
            return Err(ApiError::InvalidRequest(
                "cannot open a conversation with yourself".into(),
            ));
        }
        if vis.suppressed(peer) {
            if vis.blocked_by_viewer(peer) {
                return Err(ApiError::PermissionDenied(
                    "you have blocked this identity".into(),
                ));
            }
            // The peer blocked the requester; to them the peer does not exist.
            return Err(not_found());
        }

        if let Some(existing) = bounded(
            self.ops_timeout,
            self.store.find_direct_between(requester, peer),
        )
        .await?
        {
            return Ok((existing, false));
        }

        // A direct thread carries encrypted payloads from the first
        // message, so the peer must have published a key to wrap to.
        if !self.directory.has_encryption_key(peer).await {
            return Err(ApiError::Conflict(
                "peer has not published an encryption key".into(),
            ));
        }

        let state = if self.directory.follows(requester, peer).await {
            RequestState::Accepted
        } else {
            RequestState::Pending
        };
        let conversation = Conversation::direct(requester.clone(), peer.clone(), state);

        match bounded(self.ops_timeout, self.store.insert_conversation(&conversation)).await {
            Ok(()) => {
                info!(
                    id = %conversation.id,
                    requester = %requester,
                    peer = %peer,
                    state = state.as_str(),
                    "direct conversation created"
                );
                Ok((conversation, true))
            }
            // Lost a first-contact race from either side; the existing
            // thread is the answer.
            Err(ApiError::Conflict(_)) => {
                let existing = bounded(
                    self.ops_timeout,
                    self.store.find_direct_between(requester, peer),
                )
                .await?
                .ok_or_else(|| ApiError::Internal("direct conversation vanished".into()))?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a conversation as seen by the viewer.
    pub async fn get_for(&self, vis: &Visibility, id: Uuid) -> Result<Conversation, ApiError> {
        let conversation = bounded(self.ops_timeout, self.store.get_conversation(id))
            .await?
            .ok_or_else(not_found)?;
        screen(&conversation, vis)?;
        Ok(conversation)
    }

    /// The viewer's conversations, most recently active first, with
    /// screened threads absent rather than redacted.
    pub async fn list_for(
        &self,
        vis: &Visibility,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, ApiError> {
        let conversations = bounded(
            self.ops_timeout,
            self.store.list_conversations_for(vis.viewer(), limit, offset),
        )
        .await?;
        Ok(conversations
            .into_iter()
            .filter(|c| screen(c, vis).is_ok())
            .collect())
    }

    /// Recipient accepts a pending request.
    pub async fn accept(&self, vis: &Visibility, id: Uuid) -> Result<Conversation, ApiError> {
        let conversation = self.require_direct(vis, id).await?;
        self.require_recipient(&conversation, vis.viewer(), "accept")?;
        self.require_pending(&conversation)?;

        let updated = bounded(
            self.ops_timeout,
            self.store.set_request_state(
                id,
                Some(RequestState::Pending),
                RequestState::Accepted,
                None,
            ),
        )
        .await?;
        info!(id = %id, by = %vis.viewer(), "conversation request accepted");
        Ok(updated)
    }

    /// Recipient declines a pending request.  Terminal: a later message
    /// attempt from the requester cannot reopen it.
    pub async fn decline(&self, vis: &Visibility, id: Uuid) -> Result<Conversation, ApiError> {
        let conversation = self.require_direct(vis, id).await?;
        self.require_recipient(&conversation, vis.viewer(), "decline")?;
        self.require_pending(&conversation)?;

        let updated = bounded(
            self.ops_timeout,
            self.store.set_request_state(
                id,
                Some(RequestState::Pending),
                RequestState::Declined,
                None,
            ),
        )
        .await?;
        info!(id = %id, by = %vis.viewer(), "conversation request declined");
        Ok(updated)
    }

    /// Any participant blocks the thread from any state.  Records who
    /// blocked and writes the registry edge, so visibility filtering and
    /// the conversation state agree.
    pub async fn block(&self, vis: &Visibility, id: Uuid) -> Result<Conversation, ApiError> {
        let conversation = self.require_direct(vis, id).await?;
        let actor = vis.viewer();
        let peer = conversation
            .direct_peer(actor)
            .cloned()
            .ok_or_else(|| ApiError::Internal("direct conversation without a peer".into()))?;

        self.blocks.block(actor, &peer).await?;
        let updated = bounded(
            self.ops_timeout,
            self.store
                .set_request_state(id, None, RequestState::Blocked, Some(actor)),
        )
        .await?;
        info!(id = %id, by = %actor, "conversation blocked");
        Ok(updated)
    }

    async fn require_direct(&self, vis: &Visibility, id: Uuid) -> Result<Conversation, ApiError> {
        let conversation = self.get_for(vis, id).await?;
        if !conversation.is_direct() {
            return Err(ApiError::InvalidRequest(
                "not a direct conversation".into(),
            ));
        }
        Ok(conversation)
    }

    fn require_recipient(
        &self,
        conversation: &Conversation,
        actor: &Identity,
        action: &str,
    ) -> Result<(), ApiError> {
        if conversation.requester.as_ref() == Some(actor) {
            return Err(ApiError::PermissionDenied(format!(
                "only the recipient may {action} a request"
            )));
        }
        Ok(())
    }

    fn require_pending(&self, conversation: &Conversation) -> Result<(), ApiError> {
        if conversation.request_state != Some(RequestState::Pending) {
            return Err(ApiError::PermissionDenied("request is not pending".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{handle, TestEnv};

    #[tokio::test]
    async fn first_contact_is_pending_unless_requester_follows() {
        let env = TestEnv::new().await;
        env.directory.publish_key(&handle("bob"), "k".into()).await;
        env.directory.publish_key(&handle("carol"), "k".into()).await;

        let vis = env.vis("alice").await;
        let (conv, created) = env
            .conversations
            .open_direct(&vis, &handle("bob"))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(conv.request_state, Some(RequestState::Pending));
        assert_eq!(conv.requester, Some(handle("alice")));

        env.directory
            .set_follow(&handle("alice"), &handle("carol"), true)
            .await;
        let (conv, _) = env
            .conversations
            .open_direct(&vis, &handle("carol"))
            .await
            .unwrap();
        assert_eq!(conv.request_state, Some(RequestState::Accepted));
    }

    #[tokio::test]
    async fn open_direct_is_idempotent_per_pair() {
        let env = TestEnv::new().await;
        env.directory.publish_key(&handle("bob"), "k".into()).await;
        env.directory.publish_key(&handle("alice"), "k".into()).await;

        let (first, created) = env
            .conversations
            .open_direct(&env.vis("alice").await, &handle("bob"))
            .await
            .unwrap();
        assert!(created);

        // Same pair from the other side finds the same thread.
        let (second, created) = env
            .conversations
            .open_direct(&env.vis("bob").await, &handle("alice"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn missing_peer_key_is_a_conflict() {
        let env = TestEnv::new().await;
        let result = env
            .conversations
            .open_direct(&env.vis("alice").await, &handle("bob"))
            .await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    async fn only_the_recipient_resolves_a_request() {
        let env = TestEnv::new().await;
        let conv = env.direct("alice", "bob").await;

        // The requester cannot accept their own request.
        assert!(matches!(
            env.conversations
                .accept(&env.vis("alice").await, conv.id)
                .await,
            Err(ApiError::PermissionDenied(_))
        ));

        let accepted = env
            .conversations
            .accept(&env.vis("bob").await, conv.id)
            .await
            .unwrap();
        assert_eq!(accepted.request_state, Some(RequestState::Accepted));
    }

    #[tokio::test]
    async fn decline_is_terminal() {
        let env = TestEnv::new().await;
        let conv = env.direct("alice", "bob").await;

        let declined = env
            .conversations
            .decline(&env.vis("bob").await, conv.id)
            .await
            .unwrap();
        assert_eq!(declined.request_state, Some(RequestState::Declined));

        // No transition out of declined, and no sends either.
        assert!(matches!(
            env.conversations
                .accept(&env.vis("bob").await, conv.id)
                .await,
            Err(ApiError::PermissionDenied(_))
        ));
        assert!(!can_send(&declined, &handle("alice")));
    }

    #[tokio::test]
    async fn blocked_party_sees_nothing() {
        let env = TestEnv::new().await;
        let conv = env.direct("alice", "bob").await;

        let blocked = env
            .conversations
            .block(&env.vis("alice").await, conv.id)
            .await
            .unwrap();
        assert_eq!(blocked.request_state, Some(RequestState::Blocked));
        assert_eq!(blocked.blocked_by, Some(handle("alice")));

        // The blocker still observes the thread.
        assert!(env
            .conversations
            .get_for(&env.vis("alice").await, conv.id)
            .await
            .is_ok());

        // To the blocked party it no longer exists; not a permission error.
        assert!(matches!(
            env.conversations
                .get_for(&env.vis("bob").await, conv.id)
                .await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            env.conversations
                .open_direct(&env.vis("bob").await, &handle("alice"))
                .await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn send_permission_rule() {
        let env = TestEnv::new().await;
        let pending = env.direct("alice", "bob").await;

        assert!(can_send(&pending, &handle("alice")));
        assert!(!can_send(&pending, &handle("bob")));

        let accepted = env
            .conversations
            .accept(&env.vis("bob").await, pending.id)
            .await
            .unwrap();
        assert!(can_send(&accepted, &handle("alice")));
        assert!(can_send(&accepted, &handle("bob")));
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let env = TestEnv::new().await;
        assert!(matches!(
            env.conversations
                .accept(&env.vis("alice").await, Uuid::new_v4())
                .await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn outsiders_cannot_observe_a_thread() {
        let env = TestEnv::new().await;
        let conv = env.direct("alice", "bob").await;

        assert!(matches!(
            env.conversations
                .get_for(&env.vis("mallory").await, conv.id)
                .await,
            Err(ApiError::NotFound(_))
        ));
    }
}
