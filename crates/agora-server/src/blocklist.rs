//! Directed block edges and per-request visibility resolution.
//!
//! Blocking is symmetric for visibility (either direction suppresses) but
//! asymmetric for who holds the edge; both questions are answered from one
//! [`Visibility`] snapshot resolved once per request and threaded through
//! every read path instead of re-querying at each call site.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use agora_shared::Identity;
use agora_store::{BlockEdge, ConversationStore};

use crate::error::{bounded, ApiError};

/// Block state for one viewer, resolved from a single store fetch.
#[derive(Debug, Clone)]
pub struct Visibility {
    viewer: Identity,
    /// Identities suppressed relative to the viewer, either direction.
    suppressed: HashSet<Identity>,
    /// Identities the viewer blocked (the asymmetric subset).
    blocked_by_viewer: HashSet<Identity>,
}

impl Visibility {
    pub fn viewer(&self) -> &Identity {
        &self.viewer
    }

    /// Symmetric: true when either side blocked the other.
    pub fn suppressed(&self, other: &Identity) -> bool {
        self.suppressed.contains(other)
    }

    /// Asymmetric: true only when the viewer holds the edge.
    pub fn blocked_by_viewer(&self, other: &Identity) -> bool {
        self.blocked_by_viewer.contains(other)
    }
}

/// Registry of directed block edges.
#[derive(Clone)]
pub struct BlockRegistry {
    store: Arc<dyn ConversationStore>,
    ops_timeout: Duration,
}

impl BlockRegistry {
    pub fn new(store: Arc<dyn ConversationStore>, ops_timeout: Duration) -> Self {
        Self { store, ops_timeout }
    }

    /// Record `blocker -> blocked`.
    pub async fn block(&self, blocker: &Identity, blocked: &Identity) -> Result<(), ApiError> {
        if blocker == blocked {
            return Err(ApiError::InvalidRequest("cannot block yourself".into()));
        }
        bounded(
            self.ops_timeout,
            self.store.put_block(&BlockEdge::new(blocker.clone(), blocked.clone())),
        )
        .await?;
        info!(blocker = %blocker, blocked = %blocked, "block edge recorded");
        Ok(())
    }

    /// Remove `blocker -> blocked`.  Only the blocker's own edge is
    /// reachable through this call; nobody can lift a block held against
    /// them.
    pub async fn unblock(&self, blocker: &Identity, blocked: &Identity) -> Result<bool, ApiError> {
        let removed = bounded(self.ops_timeout, self.store.remove_block(blocker, blocked)).await?;
        if removed {
            info!(blocker = %blocker, blocked = %blocked, "block edge removed");
        }
        Ok(removed)
    }

    /// Resolve the viewer's block snapshot for this request.
    pub async fn visibility_for(&self, viewer: &Identity) -> Result<Visibility, ApiError> {
        let edges = bounded(self.ops_timeout, self.store.edges_involving(viewer)).await?;

        let mut suppressed = HashSet::new();
        let mut blocked_by_viewer = HashSet::new();
        for edge in edges {
            if edge.blocker == *viewer {
                suppressed.insert(edge.blocked.clone());
                blocked_by_viewer.insert(edge.blocked);
            } else {
                suppressed.insert(edge.blocker);
            }
        }

        Ok(Visibility {
            viewer: viewer.clone(),
            suppressed,
            blocked_by_viewer,
        })
    }

    /// Edges held by this blocker.
    pub async fn list_for(&self, blocker: &Identity) -> Result<Vec<BlockEdge>, ApiError> {
        let edges = bounded(self.ops_timeout, self.store.edges_involving(blocker)).await?;
        Ok(edges.into_iter().filter(|e| e.blocker == *blocker).collect())
    }
}
