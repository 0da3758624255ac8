//! JSON frames exchanged over an established WebSocket.
//!
//! Inbound frames are the only three things a client may say; everything
//! else a client wants to do goes through the HTTP API.  Outbound frames
//! embed conversations and messages as raw JSON values so the wire layer
//! stays decoupled from the store models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;

/// Frames a client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Pure liveness probe; answered with `pong`, no state change.
    #[serde(rename = "ping")]
    Ping,

    /// The client confirms a message reached it.
    #[serde(rename = "message:delivered", rename_all = "camelCase")]
    MessageDelivered { message_id: Uuid },

    /// The client has viewed a conversation; conversation-wide, not
    /// per-message.
    #[serde(rename = "conversation:read", rename_all = "camelCase")]
    ConversationRead { conversation_id: Uuid },
}

/// Frames the server pushes to live connections.
///
/// Delivery is best-effort: a client that misses a frame reconciles by
/// refetching over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Acknowledges a successful authenticated upgrade.
    #[serde(rename = "hello")]
    Hello { ok: bool },

    /// Reply to `ping` with the server clock.
    #[serde(rename = "pong")]
    Pong { ts: DateTime<Utc> },

    /// A message was appended to a conversation the recipient participates in.
    #[serde(rename = "message:new", rename_all = "camelCase")]
    MessageNew {
        conversation_id: Uuid,
        conversation: serde_json::Value,
        message: serde_json::Value,
    },

    /// A participant acknowledged delivery of a message.
    #[serde(rename = "message:delivered", rename_all = "camelCase")]
    MessageDelivered {
        conversation_id: Uuid,
        message_id: Uuid,
        by: Identity,
    },

    /// A participant read a conversation.
    #[serde(rename = "conversation:read", rename_all = "camelCase")]
    ConversationRead {
        conversation_id: Uuid,
        by: Identity,
        ts: DateTime<Utc>,
    },

    /// Conversation metadata changed (request-state transition, group
    /// settings, membership).
    #[serde(rename = "conversation:updated", rename_all = "camelCase")]
    ConversationUpdated {
        conversation_id: Uuid,
        conversation: serde_json::Value,
    },
}
