//! v001 -- Initial schema creation.
//!
//! Creates the four tables the sync core depends on: `profiles`, `contacts`,
//! `conversations` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (registered users)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id           TEXT PRIMARY KEY NOT NULL,   -- 8-char upper-case user id
    name         TEXT,
    display_name TEXT,
    created_at   TEXT NOT NULL                -- RFC-3339, microsecond precision
);

-- ----------------------------------------------------------------
-- Contacts (directed: owner -> contact)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    owner_id     TEXT NOT NULL,               -- FK -> profiles(id)
    contact_id   TEXT NOT NULL,               -- FK -> profiles(id)
    contact_name TEXT NOT NULL,
    created_at   TEXT NOT NULL,

    PRIMARY KEY (owner_id, contact_id),
    FOREIGN KEY (owner_id)   REFERENCES profiles(id),
    FOREIGN KEY (contact_id) REFERENCES profiles(id)
);

-- ----------------------------------------------------------------
-- Conversations (one per unordered participant pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id                   TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    participant_a        TEXT NOT NULL,              -- FK -> profiles(id)
    participant_b        TEXT NOT NULL,              -- FK -> profiles(id)
    last_message_preview TEXT,
    last_activity_at     TEXT NOT NULL,
    created_at           TEXT NOT NULL,

    CHECK (participant_a <> participant_b),
    FOREIGN KEY (participant_a) REFERENCES profiles(id),
    FOREIGN KEY (participant_b) REFERENCES profiles(id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_a ON conversations(participant_a);
CREATE INDEX IF NOT EXISTS idx_conversations_b ON conversations(participant_b);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,              -- FK -> profiles(id)
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id)       REFERENCES profiles(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
