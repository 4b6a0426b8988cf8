//! v002 -- One conversation per unordered participant pair.
//!
//! Two participants sending their first message at the same moment both miss
//! the lookup and both insert.  The expression index below makes the second
//! insert fail with a UNIQUE violation regardless of participant order, which
//! the resolver turns into a re-query.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_pair
    ON conversations(min(participant_a, participant_b), max(participant_a, participant_b));

CREATE INDEX IF NOT EXISTS idx_conversations_activity
    ON conversations(last_activity_at DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
