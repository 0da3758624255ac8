//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development (ephemeral store, dev identity key
//! that rejects every token, no SMTP).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Which [`ConversationStore`] backend to run.
///
/// [`ConversationStore`]: agora_store::ConversationStore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process maps.  Single instance only; state dies with the process.
    Memory,
    /// SQLite on disk.  The only mode safe for multiple server instances.
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Outbound notification email settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub pass: String,
    /// Sender mailbox, e.g. `"Agora <no-reply@example.org>"`.
    pub from: String,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Conversation store backend.
    /// Env: `STORE_BACKEND` (`memory` / `sqlite`)
    /// Default: `memory`
    pub store_backend: StoreBackend,

    /// SQLite database path (sqlite backend only).
    /// Env: `DB_PATH`
    /// Default: `./agora.db`
    pub db_path: PathBuf,

    /// Ed25519 public key of the identity service (hex-encoded, 64 chars).
    /// Env: `IDENTITY_SERVICE_PUBKEY`
    /// Default: all-zeros (development only; rejects every token).
    pub identity_service_pubkey: [u8; 32],

    /// Admin API bearer token. Required to access /admin/* endpoints.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Bound on every store / collaborator call; a hang becomes a
    /// deterministic unavailable error instead of a stuck request.
    /// Env: `STORE_TIMEOUT_MS`
    /// Default: `3000`
    pub ops_timeout: Duration,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Agora Node"`
    pub instance_name: String,

    /// Outbound SMTP for best-effort notification email.
    /// Env: `SMTP_HOST`, `SMTP_USER`, `SMTP_PASS`, `SMTP_FROM`
    /// Default: unset (notifications disabled).
    pub smtp: Option<SmtpConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            store_backend: StoreBackend::Memory,
            db_path: PathBuf::from("./agora.db"),
            identity_service_pubkey: [0u8; 32],
            admin_token: None,
            ops_timeout: Duration::from_millis(3000),
            instance_name: "Agora Node".to_string(),
            smtp: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(backend) = std::env::var("STORE_BACKEND") {
            match backend.as_str() {
                "memory" => config.store_backend = StoreBackend::Memory,
                "sqlite" => config.store_backend = StoreBackend::Sqlite,
                other => {
                    tracing::warn!(value = %other, "Unknown STORE_BACKEND, using default");
                }
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(hex_key) = std::env::var("IDENTITY_SERVICE_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.identity_service_pubkey = key,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid IDENTITY_SERVICE_PUBKEY, using default (dev-only)"
                    );
                }
            }
        }

        if let Ok(token) = std::env::var("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        if let Ok(val) = std::env::var("STORE_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.ops_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(host) = std::env::var("SMTP_HOST") {
            let user = std::env::var("SMTP_USER").unwrap_or_default();
            let pass = std::env::var("SMTP_PASS").unwrap_or_default();
            match std::env::var("SMTP_FROM") {
                Ok(from) if !host.is_empty() => {
                    config.smtp = Some(SmtpConfig {
                        host,
                        user,
                        pass,
                        from,
                    });
                }
                _ => {
                    tracing::warn!("SMTP_HOST set without SMTP_FROM, notifications disabled");
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex_str: &str) -> Result<[u8; 32], String> {
    let hex_str = hex_str.trim();
    if hex_str.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_str.len()));
    }

    let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex: {e}"))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.identity_service_pubkey, [0u8; 32]);
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_parse_hex_pubkey() {
        let hex_str = "ab".repeat(32);
        let key = parse_hex_pubkey(&hex_str).unwrap();
        assert_eq!(key, [0xab; 32]);
    }

    #[test]
    fn test_parse_hex_pubkey_wrong_length() {
        assert!(parse_hex_pubkey("abcd").is_err());
    }
}
