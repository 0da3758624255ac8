//! v001 -- Initial schema creation.
//!
//! Creates the six core tables: `conversations`, `conversation_members`,
//! `messages`, `receipts`, `reactions`, and `blocks`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id               TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    kind             TEXT NOT NULL,              -- direct | group
    direct_key       TEXT UNIQUE,                -- "lo|hi" pair key, direct only
    request_state    TEXT,                       -- direct only
    requester        TEXT,
    blocked_by       TEXT,
    name             TEXT,
    avatar_ref       TEXT,
    group_type       TEXT,                       -- custom | movement_verified
    movement_ref     TEXT,                       -- UUID of the backing movement
    owner            TEXT,
    admin_set        TEXT NOT NULL DEFAULT '[]', -- JSON array of handles
    post_mode        TEXT,
    poster_allowlist TEXT NOT NULL DEFAULT '[]', -- JSON array of handles
    created_at       TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated
    ON conversations(updated_at DESC);

-- ----------------------------------------------------------------
-- Participant rows (source of truth for membership queries)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversation_members (
    conversation_id TEXT NOT NULL,
    identity        TEXT NOT NULL,

    PRIMARY KEY (conversation_id, identity),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_members_identity
    ON conversation_members(identity);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,  -- global append order
    id              TEXT NOT NULL UNIQUE,               -- UUID v4
    conversation_id TEXT NOT NULL,
    sender          TEXT NOT NULL,
    body            TEXT NOT NULL,                      -- opaque, stored byte-exact
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_seq
    ON messages(conversation_id, seq DESC);

-- ----------------------------------------------------------------
-- Delivery / read receipts (set-add is INSERT OR IGNORE)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS receipts (
    message_id TEXT NOT NULL,
    identity   TEXT NOT NULL,
    kind       TEXT NOT NULL CHECK (kind IN ('delivered', 'read')),

    PRIMARY KEY (message_id, identity, kind),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Reactions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reactions (
    message_id TEXT NOT NULL,
    identity   TEXT NOT NULL,
    emoji      TEXT NOT NULL,

    PRIMARY KEY (message_id, identity, emoji),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Block edges (independent of conversations, never cascaded)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    blocker    TEXT NOT NULL,
    blocked    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (blocker, blocked)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
