//! Process-local view of platform facts this subsystem consumes.
//!
//! Follow edges, movement ownership, approved-evidence submitters,
//! movement-group opt-outs, published encryption keys, and notification
//! addresses are all owned by the wider platform; it synchronizes this
//! directory out of band (and through the admin sync endpoint).  Nothing
//! here is cached conversation state: movement-group eligibility is read
//! live at every membership-changing operation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use agora_shared::Identity;

#[derive(Default)]
struct DirectoryInner {
    /// (follower, followed) pairs.
    follows: HashSet<(Identity, Identity)>,
    movement_owners: HashMap<Uuid, Identity>,
    approved_submitters: HashMap<Uuid, BTreeSet<Identity>>,
    /// Identities that opted out of movement groups.
    opt_outs: HashSet<Identity>,
    /// Published encryption public keys (base64, opaque to the server).
    encryption_keys: HashMap<Identity, String>,
    emails: HashMap<Identity, String>,
}

/// Platform directory collaborator.
#[derive(Clone, Default)]
pub struct PlatformDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl PlatformDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Follow graph -----------------------------------------------------

    pub async fn set_follow(&self, follower: &Identity, followed: &Identity, following: bool) {
        let mut inner = self.inner.write().await;
        let pair = (follower.clone(), followed.clone());
        if following {
            inner.follows.insert(pair);
        } else {
            inner.follows.remove(&pair);
        }
    }

    pub async fn follows(&self, follower: &Identity, followed: &Identity) -> bool {
        let inner = self.inner.read().await;
        inner
            .follows
            .contains(&(follower.clone(), followed.clone()))
    }

    // -- Movements --------------------------------------------------------

    pub async fn set_movement_owner(&self, movement: Uuid, owner: Identity) {
        let mut inner = self.inner.write().await;
        inner.movement_owners.insert(movement, owner);
    }

    pub async fn movement_owner(&self, movement: Uuid) -> Option<Identity> {
        let inner = self.inner.read().await;
        inner.movement_owners.get(&movement).cloned()
    }

    pub async fn set_approved_submitter(&self, movement: Uuid, identity: &Identity, approved: bool) {
        let mut inner = self.inner.write().await;
        let submitters = inner.approved_submitters.entry(movement).or_default();
        if approved {
            submitters.insert(identity.clone());
        } else {
            submitters.remove(identity);
        }
    }

    /// The movement's current approved-evidence submitters.
    pub async fn approved_submitters(&self, movement: Uuid) -> BTreeSet<Identity> {
        let inner = self.inner.read().await;
        inner
            .approved_submitters
            .get(&movement)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_opt_out(&self, identity: &Identity, opted_out: bool) {
        let mut inner = self.inner.write().await;
        if opted_out {
            inner.opt_outs.insert(identity.clone());
        } else {
            inner.opt_outs.remove(identity);
        }
    }

    pub async fn opted_out(&self, identity: &Identity) -> bool {
        let inner = self.inner.read().await;
        inner.opt_outs.contains(identity)
    }

    /// Derived eligibility check for `movement_verified` group membership,
    /// recomputed at each call.
    pub async fn eligible_for_movement_group(&self, movement: Uuid, identity: &Identity) -> bool {
        let inner = self.inner.read().await;
        inner
            .approved_submitters
            .get(&movement)
            .map(|s| s.contains(identity))
            .unwrap_or(false)
            && !inner.opt_outs.contains(identity)
    }

    // -- Encryption keys --------------------------------------------------

    pub async fn publish_key(&self, identity: &Identity, public_key: String) {
        let mut inner = self.inner.write().await;
        inner.encryption_keys.insert(identity.clone(), public_key);
    }

    pub async fn has_encryption_key(&self, identity: &Identity) -> bool {
        let inner = self.inner.read().await;
        inner.encryption_keys.contains_key(identity)
    }

    // -- Notification addresses -------------------------------------------

    pub async fn set_email(&self, identity: &Identity, email: String) {
        let mut inner = self.inner.write().await;
        inner.emails.insert(identity.clone(), email);
    }

    pub async fn email_for(&self, identity: &Identity) -> Option<String> {
        let inner = self.inner.read().await;
        inner.emails.get(identity).cloned()
    }
}
