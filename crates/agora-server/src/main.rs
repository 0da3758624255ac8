//! # agora-server
//!
//! Realtime conversation backend for the Agora facilitation platform.
//!
//! This binary provides:
//! - **Direct conversations** with the request / accept / decline / block
//!   state machine
//! - **Group conversations** with admin sets, posting policy, and derived
//!   movement-verified membership
//! - **The message ledger** with delivery/read receipts and reactions
//! - **A WebSocket fan-out hub** pushing best-effort live updates to every
//!   participant's connections
//! - **REST API** (axum) for everything a client does outside the socket
//! - **Per-client rate limiting** to protect against abuse

mod api;
mod blocklist;
mod config;
mod conversations;
mod directory;
mod error;
mod groups;
mod hub;
mod identity;
mod ledger;
mod notify;
mod rate_limit;
mod ws;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use agora_store::{ConversationStore, MemoryStore, SqliteStore};

use crate::api::AppState;
use crate::blocklist::BlockRegistry;
use crate::config::{ServerConfig, StoreBackend};
use crate::conversations::ConversationService;
use crate::directory::PlatformDirectory;
use crate::groups::GroupService;
use crate::hub::Hub;
use crate::identity::IdentityVerifier;
use crate::ledger::MessageLedger;
use crate::notify::Notifier;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agora_server=debug")),
        )
        .init();

    info!("Starting Agora conversation server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        backend = config.store_backend.as_str(),
        admin_enabled = config.admin_token.is_some(),
        smtp_enabled = config.smtp.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // One store interface, backend chosen once here; business logic never
    // branches on it again.
    let store: Arc<dyn ConversationStore> = match config.store_backend {
        StoreBackend::Memory => {
            info!("Using ephemeral in-memory store (single instance only)");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Sqlite => Arc::new(SqliteStore::open_at(&config.db_path)?),
    };

    let blocks = BlockRegistry::new(store.clone(), config.ops_timeout);
    let directory = PlatformDirectory::new();
    let conversations = ConversationService::new(
        store.clone(),
        blocks.clone(),
        directory.clone(),
        config.ops_timeout,
    );
    let groups = GroupService::new(store.clone(), directory.clone(), config.ops_timeout);
    let ledger = MessageLedger::new(store.clone(), config.ops_timeout);
    let hub = Hub::new();
    let identity = IdentityVerifier::new(config.identity_service_pubkey);
    let notifier = Notifier::from_config(&config);

    // Rate limiter: 10 req/s sustained, burst of 30
    let rate_limiter = RateLimiter::default();

    let app_state = AppState {
        store,
        blocks,
        conversations,
        groups,
        ledger,
        hub,
        identity: identity.clone(),
        directory,
        notifier,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    // Periodic token cache cleanup (every 10 minutes)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            identity.purge_expired().await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP + WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;

    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
