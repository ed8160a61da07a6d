use rusqlite::Connection;

use crate::error::Result;

/// Initialise the browser session table and its expiry index.
///
/// Idempotent (`IF NOT EXISTS` throughout).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS browser_sessions (
            id          TEXT PRIMARY KEY,
            state       TEXT NOT NULL,   -- JSON-encoded AuthState
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            expires_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_browser_sessions_expiry
            ON browser_sessions(expires_at);",
    )?;
    Ok(())
}
