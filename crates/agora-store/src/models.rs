//! Domain model structs persisted by both conversation-store backends.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer and embedded in WebSocket frames.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_shared::Identity;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Whether a conversation is a two-party direct thread or a managed group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// Lifecycle of a direct-conversation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Accepted,
    Declined,
    Blocked,
}

/// How a group came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    /// Hand-assembled by its owner.
    Custom,
    /// Membership derived from a movement's approved-evidence submitters.
    MovementVerified,
}

/// Who may post into a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostMode {
    OwnerOnly,
    Admins,
    Selected,
    All,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

impl GroupType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::MovementVerified => "movement_verified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "custom" => Some(Self::Custom),
            "movement_verified" => Some(Self::MovementVerified),
            _ => None,
        }
    }
}

impl PostMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OwnerOnly => "owner_only",
            Self::Admins => "admins",
            Self::Selected => "selected",
            Self::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner_only" => Some(Self::OwnerOnly),
            "admins" => Some(Self::Admins),
            "selected" => Some(Self::Selected),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A conversation: a direct request/accept thread or a managed group.
///
/// Invariants maintained by the constructors and every mutation path:
/// `2 <= |participants| <= 10`; for groups, `admin_set` and
/// `poster_allowlist` are subsets of `participants` and the owner is never
/// removed from either `participants` or `admin_set`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub participants: BTreeSet<Identity>,

    // Direct-only fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_state: Option<RequestState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Identity>,

    // Group-only fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<GroupType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_ref: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Identity>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub admin_set: BTreeSet<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mode: Option<PostMode>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub poster_allowlist: BTreeSet<Identity>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a direct conversation between two identities.
    pub fn direct(requester: Identity, peer: Identity, state: RequestState) -> Self {
        let now = Utc::now();
        let mut participants = BTreeSet::new();
        participants.insert(requester.clone());
        participants.insert(peer);

        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            participants,
            request_state: Some(state),
            requester: Some(requester),
            blocked_by: None,
            name: None,
            avatar_ref: None,
            group_type: None,
            movement_ref: None,
            owner: None,
            admin_set: BTreeSet::new(),
            post_mode: None,
            poster_allowlist: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a group conversation.
    ///
    /// The owner is forced into both `participants` and `admin_set`;
    /// `admin_set` and `poster_allowlist` are intersected with the
    /// participant set.  Size bounds are the caller's responsibility (the
    /// caller knows which error shape to produce).
    #[allow(clippy::too_many_arguments)]
    pub fn group(
        name: String,
        avatar_ref: Option<String>,
        group_type: GroupType,
        movement_ref: Option<Uuid>,
        owner: Identity,
        mut participants: BTreeSet<Identity>,
        mut admin_set: BTreeSet<Identity>,
        post_mode: PostMode,
        mut poster_allowlist: BTreeSet<Identity>,
    ) -> Self {
        let now = Utc::now();
        participants.insert(owner.clone());
        admin_set.insert(owner.clone());
        admin_set.retain(|a| participants.contains(a));
        poster_allowlist.retain(|p| participants.contains(p));

        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            participants,
            request_state: None,
            requester: None,
            blocked_by: None,
            name: Some(name),
            avatar_ref,
            group_type: Some(group_type),
            movement_ref,
            owner: Some(owner),
            admin_set,
            post_mode: Some(post_mode),
            poster_allowlist,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == ConversationKind::Direct
    }

    pub fn is_participant(&self, identity: &Identity) -> bool {
        self.participants.contains(identity)
    }

    /// The other participant of a direct conversation.
    pub fn direct_peer(&self, of: &Identity) -> Option<&Identity> {
        if !self.is_direct() {
            return None;
        }
        self.participants.iter().find(|p| *p != of)
    }

    /// Canonical lookup key for the unordered pair of a direct
    /// conversation; at most one direct conversation exists per key.
    pub fn direct_pair_key(a: &Identity, b: &Identity) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{lo}|{hi}")
    }

    pub fn direct_key(&self) -> Option<String> {
        if !self.is_direct() {
            return None;
        }
        let mut iter = self.participants.iter();
        let a = iter.next()?;
        let b = iter.next()?;
        Some(Self::direct_pair_key(a, b))
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single ledger entry.  Immutable once appended, except for the three
/// tracking sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Identity,
    /// Opaque body: marker-prefixed ciphertext is stored byte-exact,
    /// plaintext arrives pre-screened by the ledger.
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Global append order; breaks wall-clock ties, never reassigned.
    pub seq: i64,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub delivered_to: BTreeSet<Identity>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub read_by: BTreeSet<Identity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, BTreeSet<Identity>>,
}

impl Message {
    /// A fresh message: read by its sender, delivered to and reacted by
    /// nobody.  `seq` is assigned by the store on append.
    pub fn new(conversation_id: Uuid, sender: Identity, body: String) -> Self {
        let mut read_by = BTreeSet::new();
        read_by.insert(sender.clone());

        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            body,
            created_at: Utc::now(),
            seq: 0,
            delivered_to: BTreeSet::new(),
            read_by,
            reactions: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Block edge
// ---------------------------------------------------------------------------

/// A directed block between two identities.  Owned independently of any
/// conversation; never deleted implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEdge {
    pub blocker: Identity,
    pub blocked: Identity,
    pub created_at: DateTime<Utc>,
}

impl BlockEdge {
    pub fn new(blocker: Identity, blocked: Identity) -> Self {
        Self {
            blocker,
            blocked,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[test]
    fn direct_pair_key_is_unordered() {
        assert_eq!(
            Conversation::direct_pair_key(&id("alice"), &id("bob")),
            Conversation::direct_pair_key(&id("bob"), &id("alice")),
        );
    }

    #[test]
    fn group_constructor_repairs_sets() {
        let mut admins = BTreeSet::new();
        admins.insert(id("stranger")); // not a participant, must be dropped

        let conv = Conversation::group(
            "organizers".into(),
            None,
            GroupType::Custom,
            None,
            id("owner"),
            [id("x"), id("y")].into_iter().collect(),
            admins,
            PostMode::All,
            [id("z")].into_iter().collect(), // not a participant either
        );

        assert!(conv.participants.contains(&id("owner")));
        assert_eq!(
            conv.admin_set,
            [id("owner")].into_iter().collect::<BTreeSet<_>>()
        );
        assert!(conv.poster_allowlist.is_empty());
    }

    #[test]
    fn fresh_message_tracking_sets() {
        let msg = Message::new(Uuid::new_v4(), id("alice"), "hi".into());
        assert_eq!(msg.read_by, [id("alice")].into_iter().collect());
        assert!(msg.delivered_to.is_empty());
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn conversation_serializes_camel_case() {
        let conv = Conversation::direct(id("alice"), id("bob"), RequestState::Pending);
        let value = serde_json::to_value(&conv).unwrap();
        assert_eq!(value["kind"], "direct");
        assert_eq!(value["requestState"], "pending");
        assert_eq!(value["requester"], "alice");
        assert!(value.get("createdAt").is_some());
    }
}
