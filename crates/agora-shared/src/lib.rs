//! # agora-shared
//!
//! Types shared between the Agora conversation server and its store layer:
//! the normalized identity handle, the signed access-token format issued by
//! the identity service, the WebSocket wire protocol, and the message-body
//! preparation rules (ciphertext passthrough vs. plaintext screening).

pub mod constants;
pub mod content;
pub mod identity;
pub mod protocol;
pub mod token;

pub use identity::Identity;
