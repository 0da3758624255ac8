//! WebSocket fan-out hub.
//!
//! A process-local registry of live connections per identity (an identity
//! may hold several: multi-device).  Broadcasting iterates the registry
//! synchronously and every send is fire-and-forget into the connection's
//! writer channel: a dead consumer loses its frame and nothing else.  No
//! queueing, no retry, no persistence of missed events; clients reconcile
//! by refetching over HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use agora_shared::protocol::ServerFrame;
use agora_shared::Identity;

pub type ConnId = Uuid;
type FrameSender = mpsc::UnboundedSender<ServerFrame>;

#[derive(Clone, Default)]
pub struct Hub {
    connections: Arc<RwLock<HashMap<Identity, HashMap<ConnId, FrameSender>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live connection for an identity.
    pub async fn register(&self, identity: &Identity, sender: FrameSender) -> ConnId {
        let conn_id = Uuid::new_v4();
        let mut connections = self.connections.write().await;
        connections
            .entry(identity.clone())
            .or_default()
            .insert(conn_id, sender);
        debug!(identity = %identity, conn = %conn_id, "connection registered");
        conn_id
    }

    /// Remove a connection; identities with no connections left are pruned
    /// from the registry.
    pub async fn unregister(&self, identity: &Identity, conn_id: ConnId) {
        let mut connections = self.connections.write().await;
        if let Some(conns) = connections.get_mut(identity) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                connections.remove(identity);
            }
        }
        debug!(identity = %identity, conn = %conn_id, "connection removed");
    }

    /// Push a frame to every live connection of every target.  Best-effort:
    /// a failed send means that connection's receiver is gone; it is
    /// skipped and the loop continues.
    pub async fn broadcast<'a, I>(&self, targets: I, frame: &ServerFrame)
    where
        I: IntoIterator<Item = &'a Identity>,
    {
        let connections = self.connections.read().await;
        for target in targets {
            let Some(conns) = connections.get(target) else {
                continue;
            };
            for sender in conns.values() {
                let _ = sender.send(frame.clone());
            }
        }
    }

    /// Whether the identity has at least one live connection.
    pub async fn is_online(&self, identity: &Identity) -> bool {
        let connections = self.connections.read().await;
        connections.contains_key(identity)
    }

    /// Total live connections across all identities.
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.values().map(HashMap::len).sum()
    }
}
