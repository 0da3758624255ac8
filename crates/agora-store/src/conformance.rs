//! Backend conformance battery.
//!
//! Both backends must behave identically under the same call sequences, so
//! the same assertions run against each.

use std::collections::BTreeSet;

use agora_shared::Identity;

use crate::memory::MemoryStore;
use crate::models::{BlockEdge, Conversation, GroupType, Message, PostMode, RequestState};
use crate::sqlite::SqliteStore;
use crate::store::ConversationStore;
use crate::StoreError;

fn id(s: &str) -> Identity {
    Identity::parse(s).unwrap()
}

async fn check_direct_lifecycle(store: &dyn ConversationStore) {
    let conv = Conversation::direct(id("alice"), id("bob"), RequestState::Pending);
    store.insert_conversation(&conv).await.unwrap();

    // The pair is unordered and unique.
    let found = store
        .find_direct_between(&id("bob"), &id("alice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, conv.id);
    assert_eq!(found.participants.len(), 2);

    let dup = Conversation::direct(id("bob"), id("alice"), RequestState::Pending);
    assert!(matches!(
        store.insert_conversation(&dup).await,
        Err(StoreError::AlreadyExists)
    ));

    // Conditional transition: wrong expectation loses.
    assert!(matches!(
        store
            .set_request_state(conv.id, Some(RequestState::Accepted), RequestState::Declined, None)
            .await,
        Err(StoreError::StateConflict)
    ));

    let accepted = store
        .set_request_state(conv.id, Some(RequestState::Pending), RequestState::Accepted, None)
        .await
        .unwrap();
    assert_eq!(accepted.request_state, Some(RequestState::Accepted));

    // Unconditional transition (block) records who blocked.
    let blocked = store
        .set_request_state(conv.id, None, RequestState::Blocked, Some(&id("bob")))
        .await
        .unwrap();
    assert_eq!(blocked.request_state, Some(RequestState::Blocked));
    assert_eq!(blocked.blocked_by, Some(id("bob")));

    assert!(matches!(
        store
            .set_request_state(uuid::Uuid::new_v4(), None, RequestState::Blocked, None)
            .await,
        Err(StoreError::NotFound)
    ));
}

async fn check_message_ledger(store: &dyn ConversationStore) {
    let conv = Conversation::direct(id("carol"), id("dave"), RequestState::Accepted);
    store.insert_conversation(&conv).await.unwrap();

    let m1 = store
        .append_message(&Message::new(conv.id, id("carol"), "first".into()))
        .await
        .unwrap();
    let m2 = store
        .append_message(&Message::new(conv.id, id("dave"), "second".into()))
        .await
        .unwrap();

    // Fresh tracking sets.
    assert_eq!(m1.read_by, [id("carol")].into_iter().collect());
    assert!(m1.delivered_to.is_empty());
    assert!(m1.reactions.is_empty());
    assert!(m2.seq > m1.seq);

    // Newest-first paging, offset respected.
    let page = store.list_messages(conv.id, 1, 0).await.unwrap();
    assert_eq!(page[0].id, m2.id);
    let page = store.list_messages(conv.id, 1, 1).await.unwrap();
    assert_eq!(page[0].id, m1.id);

    // Appending bumped the conversation's recency.
    let reloaded = store.get_conversation(conv.id).await.unwrap().unwrap();
    assert_eq!(reloaded.updated_at, m2.created_at);

    // Delivery set-add is idempotent.
    store.add_delivery(m1.id, &id("dave")).await.unwrap();
    store.add_delivery(m1.id, &id("dave")).await.unwrap();
    let m1_read = store.get_message(m1.id).await.unwrap().unwrap();
    assert_eq!(m1_read.delivered_to, [id("dave")].into_iter().collect());

    // Bulk read: marks only messages the reader did not send; idempotent.
    let marked = store.mark_read(conv.id, &id("dave")).await.unwrap();
    assert_eq!(marked, 1);
    let marked_again = store.mark_read(conv.id, &id("dave")).await.unwrap();
    assert_eq!(marked_again, 0);

    let m1_read = store.get_message(m1.id).await.unwrap().unwrap();
    assert_eq!(
        m1_read.read_by,
        [id("carol"), id("dave")].into_iter().collect()
    );
    let m2_read = store.get_message(m2.id).await.unwrap().unwrap();
    assert_eq!(m2_read.read_by, [id("dave")].into_iter().collect());

    // Reaction toggling is an involution; empty keys vanish.
    assert!(store.toggle_reaction(m1.id, &id("dave"), "👍").await.unwrap());
    let with = store.get_message(m1.id).await.unwrap().unwrap();
    assert_eq!(
        with.reactions.get("👍"),
        Some(&[id("dave")].into_iter().collect())
    );
    assert!(!store.toggle_reaction(m1.id, &id("dave"), "👍").await.unwrap());
    let without = store.get_message(m1.id).await.unwrap().unwrap();
    assert!(without.reactions.is_empty());

    // Tracking ops on unknown messages are NotFound for both backends.
    let ghost = uuid::Uuid::new_v4();
    assert!(matches!(
        store.add_delivery(ghost, &id("dave")).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.toggle_reaction(ghost, &id("dave"), "👍").await,
        Err(StoreError::NotFound)
    ));
}

async fn check_blocks(store: &dyn ConversationStore) {
    store
        .put_block(&BlockEdge::new(id("erin"), id("frank")))
        .await
        .unwrap();
    // Re-blocking is a no-op.
    store
        .put_block(&BlockEdge::new(id("erin"), id("frank")))
        .await
        .unwrap();

    let edges = store.edges_involving(&id("frank")).await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].blocker, id("erin"));

    assert!(store.remove_block(&id("erin"), &id("frank")).await.unwrap());
    assert!(!store.remove_block(&id("erin"), &id("frank")).await.unwrap());
    assert!(store.edges_involving(&id("erin")).await.unwrap().is_empty());
}

async fn check_groups_and_listing(store: &dyn ConversationStore) {
    let conv = Conversation::group(
        "organizers".into(),
        None,
        GroupType::Custom,
        None,
        id("owner"),
        [id("grace"), id("heidi")].into_iter().collect(),
        BTreeSet::new(),
        PostMode::Admins,
        BTreeSet::new(),
    );
    store.insert_conversation(&conv).await.unwrap();

    // Membership replacement is CAS on updated_at.
    let loaded = store.get_conversation(conv.id).await.unwrap().unwrap();
    let updated = store
        .set_membership(
            conv.id,
            loaded.updated_at,
            [id("owner"), id("grace")].into_iter().collect(),
            [id("owner"), id("grace")].into_iter().collect(),
            BTreeSet::new(),
        )
        .await
        .unwrap();
    assert_eq!(updated.participants.len(), 2);
    assert!(matches!(
        store
            .set_membership(
                conv.id,
                loaded.updated_at,
                updated.participants.clone(),
                updated.admin_set.clone(),
                BTreeSet::new(),
            )
            .await,
        Err(StoreError::StateConflict)
    ));

    // Group patch repairs sets against the participant roster.
    let patched = store
        .update_group(
            conv.id,
            crate::store::GroupPatch {
                post_mode: Some(PostMode::Selected),
                poster_allowlist: Some([id("grace"), id("zeke")].into_iter().collect()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.post_mode, Some(PostMode::Selected));
    assert_eq!(
        patched.poster_allowlist,
        [id("grace")].into_iter().collect()
    );

    // Listing is recency-ordered and membership-scoped.
    let listed = store
        .list_conversations_for(&id("grace"), 10, 0)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, conv.id);
    assert!(store
        .list_conversations_for(&id("heidi"), 10, 0)
        .await
        .unwrap()
        .is_empty());

    // Purge removes the conversation and its ledger.
    let msg = store
        .append_message(&Message::new(conv.id, id("owner"), "minutes".into()))
        .await
        .unwrap();
    assert!(store.delete_conversation(conv.id).await.unwrap());
    assert!(!store.delete_conversation(conv.id).await.unwrap());
    assert!(store.get_conversation(conv.id).await.unwrap().is_none());
    assert!(store.get_message(msg.id).await.unwrap().is_none());
}

async fn run_battery(store: &dyn ConversationStore) {
    check_direct_lifecycle(store).await;
    check_message_ledger(store).await;
    check_blocks(store).await;
    check_groups_and_listing(store).await;
}

#[tokio::test]
async fn memory_backend_conforms() {
    let store = MemoryStore::new();
    run_battery(&store).await;
}

#[tokio::test]
async fn sqlite_backend_conforms() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("conformance.db")).unwrap();
    run_battery(&store).await;
}
