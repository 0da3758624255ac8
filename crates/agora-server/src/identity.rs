//! Access-token verification and caching.
//!
//! Tokens are issued by the external identity service and verified locally
//! against its Ed25519 public key; successful verifications are cached so
//! repeat requests skip the signature check.  The rest of the server
//! consumes this as an opaque "bearer token in, verified handle out"
//! function.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use agora_shared::token::{decode_token, verify_access_token};
use agora_shared::Identity;

/// A cached verification result.
#[derive(Debug, Clone)]
struct CachedIdentity {
    identity: Identity,
    /// When the underlying token expires (from the token itself).
    expires_at: DateTime<Utc>,
}

impl CachedIdentity {
    fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Verifies and caches access tokens.
#[derive(Clone)]
pub struct IdentityVerifier {
    /// The identity service's Ed25519 public key.
    service_pubkey: [u8; 32],
    /// Cache: raw token -> verified handle.
    cache: Arc<RwLock<HashMap<String, CachedIdentity>>>,
}

impl IdentityVerifier {
    pub fn new(service_pubkey: [u8; 32]) -> Self {
        Self {
            service_pubkey,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve a raw bearer token to a verified handle.
    ///
    /// Returns `None` for malformed, expired, or forged tokens.
    pub async fn verify_bearer(&self, raw: &str) -> Option<Identity> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(raw) {
                if entry.is_fresh() {
                    return Some(entry.identity.clone());
                }
            }
        }

        let token = decode_token(raw)?;
        let identity = verify_access_token(&token, &self.service_pubkey)?;

        {
            let mut cache = self.cache.write().await;
            cache.insert(
                raw.to_string(),
                CachedIdentity {
                    identity: identity.clone(),
                    expires_at: token.expires_at,
                },
            );
        }

        debug!(identity = %identity, "access token verified");
        Some(identity)
    }

    /// Evict expired entries from the cache.
    pub async fn purge_expired(&self) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.is_fresh());
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, "purged expired token cache entries");
        }
    }
}
