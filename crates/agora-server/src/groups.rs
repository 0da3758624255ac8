//! Group membership and posting policy.
//!
//! Custom groups are managed by their admin set.  `movement_verified`
//! groups are managed only by the movement's owner, and their membership is
//! a derived view over the movement's approved-evidence submitters minus
//! opt-outs, recomputed from the directory at every membership-changing
//! operation.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use agora_shared::constants::{MAX_PARTICIPANTS, MIN_PARTICIPANTS};
use agora_shared::Identity;
use agora_store::{
    Conversation, ConversationKind, ConversationStore, GroupPatch, GroupType, PostMode,
};

use crate::blocklist::Visibility;
use crate::conversations::screen;
use crate::directory::PlatformDirectory;
use crate::error::{bounded, ApiError};

/// The posting-policy table.
pub fn can_post(conversation: &Conversation, identity: &Identity) -> bool {
    if !conversation.is_participant(identity) {
        return false;
    }
    match conversation.post_mode {
        Some(PostMode::All) | None => true,
        Some(PostMode::Admins) => conversation.admin_set.contains(identity),
        Some(PostMode::OwnerOnly) => match &conversation.owner {
            Some(owner) => owner == identity,
            // Ownerless legacy rows fall back to the admin set.
            None => conversation.admin_set.contains(identity),
        },
        Some(PostMode::Selected) => {
            conversation.admin_set.contains(identity)
                || conversation.poster_allowlist.contains(identity)
        }
    }
}

/// Admins manage; the owner is always an admin by invariant.
pub fn can_manage(conversation: &Conversation, identity: &Identity) -> bool {
    conversation.admin_set.contains(identity)
}

/// Parameters for creating a group.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub avatar_ref: Option<String>,
    pub group_type: GroupType,
    pub movement_ref: Option<Uuid>,
    pub participants: BTreeSet<Identity>,
    pub post_mode: PostMode,
    pub admin_set: BTreeSet<Identity>,
    pub poster_allowlist: BTreeSet<Identity>,
}

/// Group conversation service.
#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn ConversationStore>,
    directory: PlatformDirectory,
    ops_timeout: Duration,
}

impl GroupService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        directory: PlatformDirectory,
        ops_timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            ops_timeout,
        }
    }

    pub async fn create(&self, owner: &Identity, params: NewGroup) -> Result<Conversation, ApiError> {
        let name = params.name.trim();
        if name.is_empty() || name.len() > 80 {
            return Err(ApiError::InvalidRequest(
                "group name must be 1-80 characters".into(),
            ));
        }

        let participants = match params.group_type {
            GroupType::Custom => {
                let mut participants = params.participants;
                participants.insert(owner.clone());
                participants
            }
            GroupType::MovementVerified => {
                let movement = params.movement_ref.ok_or_else(|| {
                    ApiError::InvalidRequest(
                        "movement_verified groups require a movementRef".into(),
                    )
                })?;
                self.require_movement_owner(movement, owner).await?;

                // Derived membership, read live: approved submitters who
                // have not opted out, plus the owner.
                let mut participants = BTreeSet::new();
                participants.insert(owner.clone());
                for submitter in self.directory.approved_submitters(movement).await {
                    if !self.directory.opted_out(&submitter).await {
                        participants.insert(submitter);
                    }
                }
                participants
            }
        };
        check_size(participants.len())?;

        let conversation = Conversation::group(
            name.to_string(),
            params.avatar_ref,
            params.group_type,
            params.movement_ref,
            owner.clone(),
            participants,
            params.admin_set,
            params.post_mode,
            params.poster_allowlist,
        );

        bounded(self.ops_timeout, self.store.insert_conversation(&conversation)).await?;
        info!(
            id = %conversation.id,
            owner = %owner,
            group_type = conversation.group_type.map(GroupType::as_str).unwrap_or("custom"),
            members = conversation.participants.len(),
            "group conversation created"
        );
        Ok(conversation)
    }

    /// Patch name / avatar / posting policy / admin set / allowlist.
    pub async fn patch(
        &self,
        vis: &Visibility,
        id: Uuid,
        patch: GroupPatch,
    ) -> Result<Conversation, ApiError> {
        let conversation = self.require_managed_group(vis, id).await?;
        let updated = bounded(self.ops_timeout, self.store.update_group(conversation.id, patch))
            .await?;
        info!(id = %id, by = %vis.viewer(), "group settings updated");
        Ok(updated)
    }

    /// Add and remove participants in one step.
    pub async fn update_membership(
        &self,
        vis: &Visibility,
        id: Uuid,
        add: Vec<Identity>,
        remove: Vec<Identity>,
    ) -> Result<Conversation, ApiError> {
        let conversation = self.require_managed_group(vis, id).await?;
        let owner = conversation.owner.clone();

        if let Some(owner) = &owner {
            if remove.contains(owner) {
                return Err(ApiError::PermissionDenied(
                    "the owner cannot be removed".into(),
                ));
            }
        }

        // Movement groups re-validate every addition against the live
        // evidence and opt-out state.
        if conversation.group_type == Some(GroupType::MovementVerified) {
            let movement = conversation.movement_ref.ok_or_else(|| {
                ApiError::Internal("movement_verified group without movementRef".into())
            })?;
            for identity in &add {
                if !conversation.is_participant(identity)
                    && !self
                        .directory
                        .eligible_for_movement_group(movement, identity)
                        .await
                {
                    return Err(ApiError::Conflict(format!(
                        "{identity} is not an approved movement participant"
                    )));
                }
            }
        }

        let mut participants = conversation.participants.clone();
        for identity in add {
            participants.insert(identity);
        }
        for identity in &remove {
            participants.remove(identity);
        }
        check_size(participants.len())?;

        // Dangling admin / poster references are dropped, not errored.
        let mut admin_set: BTreeSet<Identity> = conversation
            .admin_set
            .iter()
            .filter(|a| participants.contains(*a))
            .cloned()
            .collect();
        if let Some(owner) = owner {
            admin_set.insert(owner);
        }
        let poster_allowlist: BTreeSet<Identity> = conversation
            .poster_allowlist
            .iter()
            .filter(|p| participants.contains(*p))
            .cloned()
            .collect();

        let updated = bounded(
            self.ops_timeout,
            self.store.set_membership(
                conversation.id,
                conversation.updated_at,
                participants,
                admin_set,
                poster_allowlist,
            ),
        )
        .await?;
        info!(
            id = %id,
            by = %vis.viewer(),
            members = updated.participants.len(),
            "group membership updated"
        );
        Ok(updated)
    }

    /// Load a group and check the actor may manage it.
    async fn require_managed_group(
        &self,
        vis: &Visibility,
        id: Uuid,
    ) -> Result<Conversation, ApiError> {
        let conversation = bounded(self.ops_timeout, self.store.get_conversation(id))
            .await?
            .ok_or_else(|| ApiError::NotFound("conversation not found".into()))?;
        screen(&conversation, vis)?;
        if conversation.kind != ConversationKind::Group {
            return Err(ApiError::InvalidRequest("not a group conversation".into()));
        }

        if conversation.group_type == Some(GroupType::MovementVerified) {
            let movement = conversation.movement_ref.ok_or_else(|| {
                ApiError::Internal("movement_verified group without movementRef".into())
            })?;
            self.require_movement_owner(movement, vis.viewer()).await?;
        } else if !can_manage(&conversation, vis.viewer()) {
            return Err(ApiError::PermissionDenied(
                "only group admins may do that".into(),
            ));
        }
        Ok(conversation)
    }

    async fn require_movement_owner(
        &self,
        movement: Uuid,
        identity: &Identity,
    ) -> Result<(), ApiError> {
        match self.directory.movement_owner(movement).await {
            Some(owner) if owner == *identity => Ok(()),
            Some(_) => Err(ApiError::PermissionDenied(
                "only the movement owner may manage a verified group".into(),
            )),
            None => Err(ApiError::Conflict("unknown movement".into())),
        }
    }
}

fn check_size(len: usize) -> Result<(), ApiError> {
    if len > MAX_PARTICIPANTS {
        return Err(ApiError::Conflict(format!(
            "participant cap exceeded ({len} > {MAX_PARTICIPANTS})"
        )));
    }
    if len < MIN_PARTICIPANTS {
        return Err(ApiError::InvalidRequest(format!(
            "a conversation needs at least {MIN_PARTICIPANTS} participants"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{handle, set, TestEnv};

    #[tokio::test]
    async fn posting_policy_table() {
        let owner = handle("owner");
        let conv = Conversation::group(
            "g".into(),
            None,
            GroupType::Custom,
            None,
            owner.clone(),
            set(&["x", "y", "z"]),
            set(&["x"]),
            PostMode::All,
            set(&["y"]),
        );

        // all
        assert!(can_post(&conv, &handle("z")));
        assert!(!can_post(&conv, &handle("stranger")));

        let mut admins_only = conv.clone();
        admins_only.post_mode = Some(PostMode::Admins);
        assert!(can_post(&admins_only, &owner));
        assert!(can_post(&admins_only, &handle("x")));
        assert!(!can_post(&admins_only, &handle("y")));

        let mut owner_only = conv.clone();
        owner_only.post_mode = Some(PostMode::OwnerOnly);
        assert!(can_post(&owner_only, &owner));
        assert!(!can_post(&owner_only, &handle("x")));
        // Ownerless fallback: the admin set may post.
        owner_only.owner = None;
        assert!(can_post(&owner_only, &handle("x")));

        let mut selected = conv;
        selected.post_mode = Some(PostMode::Selected);
        assert!(can_post(&selected, &handle("x"))); // admin
        assert!(can_post(&selected, &handle("y"))); // allowlisted
        assert!(!can_post(&selected, &handle("z")));
    }

    #[tokio::test]
    async fn admins_gain_posting_rights_when_promoted() {
        let env = TestEnv::new().await;
        let conv = env
            .group("owner", &["x", "y"], PostMode::Admins)
            .await;

        assert!(!can_post(&conv, &handle("x")));

        let vis = env.vis("owner").await;
        let updated = env
            .groups
            .patch(
                &vis,
                conv.id,
                GroupPatch {
                    admin_set: Some(set(&["x"])),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(can_post(&updated, &handle("x")));
        // The owner stayed an admin through the patch.
        assert!(updated.admin_set.contains(&handle("owner")));
    }

    #[tokio::test]
    async fn non_admins_cannot_manage() {
        let env = TestEnv::new().await;
        let conv = env.group("owner", &["x", "y"], PostMode::All).await;

        let result = env
            .groups
            .patch(
                &env.vis("x").await,
                conv.id,
                GroupPatch {
                    post_mode: Some(PostMode::Admins),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn owner_cannot_be_removed_and_cap_holds() {
        let env = TestEnv::new().await;
        let conv = env.group("owner", &["x", "y"], PostMode::All).await;
        let vis = env.vis("owner").await;

        assert!(matches!(
            env.groups
                .update_membership(&vis, conv.id, vec![], vec![handle("owner")])
                .await,
            Err(ApiError::PermissionDenied(_))
        ));

        // 3 existing + 8 more = 11 > 10.
        let add: Vec<Identity> = (0..8).map(|i| handle(&format!("m{i}"))).collect();
        assert!(matches!(
            env.groups.update_membership(&vis, conv.id, add, vec![]).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn removal_drops_dangling_admin_and_poster_refs() {
        let env = TestEnv::new().await;
        let conv = env.group("owner", &["x", "y"], PostMode::Selected).await;
        let vis = env.vis("owner").await;

        let conv = env
            .groups
            .patch(
                &vis,
                conv.id,
                GroupPatch {
                    admin_set: Some(set(&["x"])),
                    poster_allowlist: Some(set(&["y"])),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(conv.admin_set.contains(&handle("x")));

        let updated = env
            .groups
            .update_membership(&vis, conv.id, vec![], vec![handle("x"), handle("y")])
            .await;
        // Removing both would leave only the owner: below the minimum.
        assert!(matches!(updated, Err(ApiError::InvalidRequest(_))));

        let updated = env
            .groups
            .update_membership(&vis, conv.id, vec![handle("z")], vec![handle("x"), handle("y")])
            .await
            .unwrap();
        assert!(!updated.admin_set.contains(&handle("x")));
        assert!(updated.poster_allowlist.is_empty());
        assert!(updated.admin_set.contains(&handle("owner")));
    }

    #[tokio::test]
    async fn movement_groups_derive_membership_and_lock_management() {
        let env = TestEnv::new().await;
        let movement = Uuid::new_v4();
        env.directory
            .set_movement_owner(movement, handle("owner"))
            .await;
        for s in ["grace", "heidi", "ivan"] {
            env.directory
                .set_approved_submitter(movement, &handle(s), true)
                .await;
        }
        env.directory.set_opt_out(&handle("ivan"), true).await;

        let conv = env
            .groups
            .create(
                &handle("owner"),
                NewGroup {
                    name: "verified".into(),
                    avatar_ref: None,
                    group_type: GroupType::MovementVerified,
                    movement_ref: Some(movement),
                    participants: BTreeSet::new(),
                    post_mode: PostMode::Admins,
                    admin_set: BTreeSet::new(),
                    poster_allowlist: BTreeSet::new(),
                },
            )
            .await
            .unwrap();

        // Opted-out submitters are excluded from the derived roster.
        assert_eq!(conv.participants, set(&["owner", "grace", "heidi"]));

        // Other admins cannot manage a verified group; only the movement
        // owner can.
        assert!(matches!(
            env.groups
                .update_membership(&env.vis("grace").await, conv.id, vec![handle("judy")], vec![])
                .await,
            Err(ApiError::PermissionDenied(_))
        ));

        // Additions are re-validated at add time.
        assert!(matches!(
            env.groups
                .update_membership(&env.vis("owner").await, conv.id, vec![handle("judy")], vec![])
                .await,
            Err(ApiError::Conflict(_))
        ));

        env.directory
            .set_approved_submitter(movement, &handle("judy"), true)
            .await;
        let updated = env
            .groups
            .update_membership(&env.vis("owner").await, conv.id, vec![handle("judy")], vec![])
            .await
            .unwrap();
        assert!(updated.is_participant(&handle("judy")));
    }

    #[tokio::test]
    async fn non_movement_owner_cannot_create_verified_group() {
        let env = TestEnv::new().await;
        let movement = Uuid::new_v4();
        env.directory
            .set_movement_owner(movement, handle("owner"))
            .await;

        let result = env
            .groups
            .create(
                &handle("grace"),
                NewGroup {
                    name: "verified".into(),
                    avatar_ref: None,
                    group_type: GroupType::MovementVerified,
                    movement_ref: Some(movement),
                    participants: BTreeSet::new(),
                    post_mode: PostMode::Admins,
                    admin_set: BTreeSet::new(),
                    poster_allowlist: BTreeSet::new(),
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::PermissionDenied(_))));
    }
}
