//! Message-body preparation.
//!
//! Bodies carrying the ciphertext marker are opaque encrypted payloads: the
//! server stores them byte-exact and never transforms them.  Everything else
//! is plaintext and goes through trimming, a length bound, and a coarse
//! content screen.  The platform runs full moderation out of band; the
//! screen here only stops the patterns that must never hit the ledger.

use thiserror::Error;

/// Prefix marking a message body as an opaque encrypted payload.
pub const CIPHERTEXT_MARKER: &str = "cipher:v1:";

/// Upper bound for plaintext bodies after trimming.
pub const MAX_PLAINTEXT_BYTES: usize = 4096;

/// Upper bound for a reaction emoji.
pub const MAX_EMOJI_BYTES: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BodyRejected {
    #[error("Message body is empty")]
    Empty,

    #[error("Message body exceeds {MAX_PLAINTEXT_BYTES} bytes")]
    TooLong,

    #[error("Message body contains control characters")]
    ControlChars,

    #[error("Message body matches a blocked pattern")]
    BlockedPattern,
}

/// Patterns screened out of plaintext bodies.
const DENY_PATTERNS: &[&str] = &["javascript:", "data:text/html"];

/// Prepare a raw body for the ledger.
///
/// Marker-prefixed input is returned unchanged, whatever its length or
/// content.  Plaintext is whitespace-trimmed and validated.
pub fn prepare_body(raw: &str) -> Result<String, BodyRejected> {
    if raw.starts_with(CIPHERTEXT_MARKER) {
        return Ok(raw.to_string());
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BodyRejected::Empty);
    }
    if trimmed.len() > MAX_PLAINTEXT_BYTES {
        return Err(BodyRejected::TooLong);
    }
    if trimmed
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t')
    {
        return Err(BodyRejected::ControlChars);
    }

    let lowered = trimmed.to_ascii_lowercase();
    if DENY_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Err(BodyRejected::BlockedPattern);
    }

    Ok(trimmed.to_string())
}

/// Validate a reaction emoji: short, printable, no whitespace.
pub fn valid_emoji(emoji: &str) -> bool {
    !emoji.is_empty()
        && emoji.len() <= MAX_EMOJI_BYTES
        && !emoji.chars().any(|c| c.is_control() || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciphertext_is_byte_exact() {
        let body = format!("{CIPHERTEXT_MARKER}  AAAA\x00BBBB  ");
        assert_eq!(prepare_body(&body).unwrap(), body);

        // Oversized ciphertext passes untouched too.
        let big = format!("{}{}", CIPHERTEXT_MARKER, "x".repeat(MAX_PLAINTEXT_BYTES * 2));
        assert_eq!(prepare_body(&big).unwrap(), big);
    }

    #[test]
    fn plaintext_is_trimmed() {
        assert_eq!(prepare_body("  hello there\n").unwrap(), "hello there");
    }

    #[test]
    fn plaintext_rejections() {
        assert_eq!(prepare_body("   "), Err(BodyRejected::Empty));
        assert_eq!(
            prepare_body(&"x".repeat(MAX_PLAINTEXT_BYTES + 1)),
            Err(BodyRejected::TooLong)
        );
        assert_eq!(prepare_body("a\x07b"), Err(BodyRejected::ControlChars));
        assert_eq!(
            prepare_body("click JAVASCRIPT:alert(1)"),
            Err(BodyRejected::BlockedPattern)
        );
    }

    #[test]
    fn newlines_and_tabs_are_fine() {
        assert!(prepare_body("line one\nline\ttwo").is_ok());
    }

    #[test]
    fn emoji_validation() {
        assert!(valid_emoji("👍"));
        assert!(valid_emoji("❤️"));
        assert!(!valid_emoji(""));
        assert!(!valid_emoji("a b"));
        assert!(!valid_emoji(&"🎉".repeat(8)));
    }
}
