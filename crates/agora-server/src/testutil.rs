//! Shared fixtures for service-level tests: an in-memory store wired the
//! same way `main` wires production.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use agora_shared::Identity;
use agora_store::{Conversation, ConversationStore, GroupType, MemoryStore, PostMode};

use crate::blocklist::{BlockRegistry, Visibility};
use crate::conversations::ConversationService;
use crate::directory::PlatformDirectory;
use crate::groups::{GroupService, NewGroup};
use crate::ledger::MessageLedger;

pub fn handle(s: &str) -> Identity {
    Identity::parse(s).unwrap()
}

pub fn set(names: &[&str]) -> BTreeSet<Identity> {
    names.iter().map(|s| handle(s)).collect()
}

pub struct TestEnv {
    pub store: Arc<dyn ConversationStore>,
    pub blocks: BlockRegistry,
    pub directory: PlatformDirectory,
    pub conversations: ConversationService,
    pub groups: GroupService,
    pub ledger: MessageLedger,
}

impl TestEnv {
    pub async fn new() -> Self {
        let store: Arc<dyn ConversationStore> = Arc::new(MemoryStore::new());
        let ops_timeout = Duration::from_secs(1);
        let blocks = BlockRegistry::new(store.clone(), ops_timeout);
        let directory = PlatformDirectory::new();
        let conversations = ConversationService::new(
            store.clone(),
            blocks.clone(),
            directory.clone(),
            ops_timeout,
        );
        let groups = GroupService::new(store.clone(), directory.clone(), ops_timeout);
        let ledger = MessageLedger::new(store.clone(), ops_timeout);

        Self {
            store,
            blocks,
            directory,
            conversations,
            groups,
            ledger,
        }
    }

    pub async fn vis(&self, who: &str) -> Visibility {
        self.blocks.visibility_for(&handle(who)).await.unwrap()
    }

    /// Open a direct thread `a -> b`, publishing `b`'s key first.
    pub async fn direct(&self, a: &str, b: &str) -> Conversation {
        self.directory.publish_key(&handle(b), "test-key".into()).await;
        let vis = self.vis(a).await;
        let (conversation, _) = self
            .conversations
            .open_direct(&vis, &handle(b))
            .await
            .unwrap();
        conversation
    }

    /// A direct thread `a -> b` already accepted by `b`.
    pub async fn accepted_direct(&self, a: &str, b: &str) -> Conversation {
        let conversation = self.direct(a, b).await;
        self.conversations
            .accept(&self.vis(b).await, conversation.id)
            .await
            .unwrap()
    }

    /// A custom group owned by `owner` with the given extra members.
    pub async fn group(&self, owner: &str, members: &[&str], post_mode: PostMode) -> Conversation {
        self.groups
            .create(
                &handle(owner),
                NewGroup {
                    name: "test group".into(),
                    avatar_ref: None,
                    group_type: GroupType::Custom,
                    movement_ref: None,
                    participants: set(members),
                    post_mode,
                    admin_set: BTreeSet::new(),
                    poster_allowlist: BTreeSet::new(),
                },
            )
            .await
            .unwrap()
    }
}
