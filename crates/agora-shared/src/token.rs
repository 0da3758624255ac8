use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

// Token signed by the identity service; clients present it as a bearer
// header on HTTP requests and as the `access_token` query parameter on the
// WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub handle: Identity,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: Vec<u8>,
}

/// Verify a token against the identity service public key.
///
/// Returns the verified handle, or `None` when the token is expired or the
/// signature does not check out.
pub fn verify_access_token(token: &AccessToken, service_pubkey: &[u8; 32]) -> Option<Identity> {
    if Utc::now() > token.expires_at {
        return None;
    }

    let Ok(verifying_key) = VerifyingKey::from_bytes(service_pubkey) else {
        return None;
    };

    // payload = handle || expires_at (rfc3339)
    let mut payload = Vec::new();
    payload.extend_from_slice(token.handle.as_str().as_bytes());
    payload.extend_from_slice(token.expires_at.to_rfc3339().as_bytes());

    let Ok(signature) = Signature::from_slice(&token.signature) else {
        return None;
    };

    verifying_key.verify(&payload, &signature).ok()?;
    Some(token.handle.clone())
}

/// Issue a token.  Lives here so the identity service tooling and the test
/// suites sign with exactly the payload `verify_access_token` checks.
pub fn create_access_token(
    handle: &Identity,
    expires_at: DateTime<Utc>,
    service_signing_key: &ed25519_dalek::SigningKey,
) -> AccessToken {
    use ed25519_dalek::Signer;

    let mut payload = Vec::new();
    payload.extend_from_slice(handle.as_str().as_bytes());
    payload.extend_from_slice(expires_at.to_rfc3339().as_bytes());

    let signature = service_signing_key.sign(&payload);

    AccessToken {
        handle: handle.clone(),
        issued_at: Utc::now(),
        expires_at,
        signature: signature.to_bytes().to_vec(),
    }
}

/// Encode a token for transport: base64(JSON).
pub fn encode_token(token: &AccessToken) -> String {
    // Serialization of a plain struct cannot fail.
    let json = serde_json::to_vec(token).expect("token serializes");
    BASE64.encode(json)
}

/// Decode a transported token.  Returns `None` on any malformation; the
/// caller treats that the same as a failed verification.
pub fn decode_token(raw: &str) -> Option<AccessToken> {
    let bytes = BASE64.decode(raw.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}
