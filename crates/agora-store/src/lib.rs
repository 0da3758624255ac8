//! # agora-store
//!
//! Persistence for the Agora conversation subsystem.
//!
//! The crate exposes a single [`ConversationStore`] trait and two conforming
//! backends: an ephemeral in-process [`MemoryStore`] and a durable
//! [`SqliteStore`].  Business logic is handed one of them behind
//! `Arc<dyn ConversationStore>` at startup and never branches on which.

pub mod memory;
pub mod models;
pub mod sqlite;
pub mod store;

mod error;

#[cfg(test)]
mod conformance;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use models::*;
pub use sqlite::SqliteStore;
pub use store::{ConversationStore, GroupPatch};
