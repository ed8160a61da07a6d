use std::sync::{Mutex, MutexGuard};

use autobot_core::AccessToken;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, SessionError};
use crate::types::{AuthState, BrowserSession};

/// Thread-safe store for server-held browser sessions.
///
/// Wraps a single SQLite connection in a `Mutex`; every transition is a
/// read-modify-write under that lock, so two concurrent callbacks for the
/// same session cannot both succeed.
pub struct SessionStore {
    db: Mutex<Connection>,
    ttl: Duration,
}

impl SessionStore {
    /// Wrap an open connection, creating the table if needed.
    pub fn new(conn: Connection, ttl: Duration) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            ttl,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| SessionError::Unavailable)
    }

    /// Create a fresh, unauthenticated session.
    #[instrument(skip(self))]
    pub fn create(&self) -> Result<BrowserSession> {
        let now = Utc::now();
        let session = BrowserSession {
            id: Uuid::new_v4().to_string(),
            state: AuthState::Unauthenticated,
            created_at: now,
            expires_at: now + self.ttl,
        };
        let db = self.lock()?;
        db.execute(
            "INSERT INTO browser_sessions (id, state, created_at, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?3, ?4)",
            params![
                session.id,
                serde_json::to_string(&session.state)?,
                ts(now),
                ts(session.expires_at),
            ],
        )?;
        debug!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// Load a live session. Expired rows are deleted and reported as `None`.
    #[instrument(skip(self))]
    pub fn load(&self, id: &str) -> Result<Option<BrowserSession>> {
        let db = self.lock()?;
        load_locked(&db, id, Utc::now())
    }

    /// Unauthenticated/AwaitingCallback → AwaitingCallback with a new CSRF state.
    #[instrument(skip(self, csrf_state))]
    pub fn begin_authorization(&self, id: &str, csrf_state: String) -> Result<BrowserSession> {
        self.transition(id, |state| state.begin(csrf_state))
    }

    /// AwaitingCallback(csrf_state) → Authenticated.
    #[instrument(skip(self, csrf_state, access_token))]
    pub fn complete_authorization(
        &self,
        id: &str,
        csrf_state: &str,
        access_token: AccessToken,
    ) -> Result<BrowserSession> {
        let session = self.transition(id, |state| state.complete(csrf_state, access_token))?;
        info!(session_id = %id, "session authenticated");
        Ok(session)
    }

    /// Drop any outstanding CSRF state after a failed callback.
    #[instrument(skip(self))]
    pub fn abandon_authorization(&self, id: &str) -> Result<BrowserSession> {
        self.transition(id, |_| Ok(AuthState::Unauthenticated))
    }

    /// Permanently delete a session (logout).
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.lock()?;
        let n = db.execute("DELETE FROM browser_sessions WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SessionError::NotFound { id: id.to_string() });
        }
        info!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Remove every expired session. Returns how many were deleted.
    pub fn purge_expired(&self) -> Result<usize> {
        let db = self.lock()?;
        let n = db.execute(
            "DELETE FROM browser_sessions WHERE expires_at <= ?1",
            [ts(Utc::now())],
        )?;
        if n > 0 {
            debug!(count = n, "expired sessions purged");
        }
        Ok(n)
    }

    /// Apply `f` to the current state and persist the result, sliding the expiry.
    fn transition(
        &self,
        id: &str,
        f: impl FnOnce(&AuthState) -> Result<AuthState>,
    ) -> Result<BrowserSession> {
        let db = self.lock()?;
        let now = Utc::now();
        let mut session = load_locked(&db, id, now)?.ok_or_else(|| SessionError::NotFound {
            id: id.to_string(),
        })?;

        session.state = f(&session.state)?;
        session.expires_at = now + self.ttl;
        db.execute(
            "UPDATE browser_sessions SET state = ?1, updated_at = ?2, expires_at = ?3
             WHERE id = ?4",
            params![
                serde_json::to_string(&session.state)?,
                ts(now),
                ts(session.expires_at),
                id
            ],
        )?;
        debug!(session_id = %id, state = session.state.name(), "session state changed");
        Ok(session)
    }
}

fn load_locked(db: &Connection, id: &str, now: DateTime<Utc>) -> Result<Option<BrowserSession>> {
    let row: Option<(String, String, String)> = db
        .query_row(
            "SELECT state, created_at, expires_at FROM browser_sessions WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let Some((state, created_at, expires_at)) = row else {
        return Ok(None);
    };

    let expires_at = parse_ts(2, &expires_at)?;
    if expires_at <= now {
        db.execute("DELETE FROM browser_sessions WHERE id = ?1", [id])?;
        debug!(session_id = %id, "expired session discarded");
        return Ok(None);
    }

    Ok(Some(BrowserSession {
        id: id.to_string(),
        state: serde_json::from_str(&state)?,
        created_at: parse_ts(1, &created_at)?,
        expires_at,
    }))
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Connection::open_in_memory().unwrap(), Duration::hours(1)).unwrap()
    }

    #[test]
    fn full_login_flow() {
        let store = store();
        let session = store.create().unwrap();
        assert_eq!(session.state, AuthState::Unauthenticated);

        store.begin_authorization(&session.id, "csrf-1".to_string()).unwrap();
        let loaded = store.load(&session.id).unwrap().unwrap();
        assert_eq!(loaded.state.pending_csrf_state(), Some("csrf-1"));

        store
            .complete_authorization(&session.id, "csrf-1", AccessToken::new("gho_abc"))
            .unwrap();
        let loaded = store.load(&session.id).unwrap().unwrap();
        assert_eq!(loaded.access_token().map(|t| t.secret()), Some("gho_abc"));
    }

    #[test]
    fn csrf_state_is_single_use() {
        let store = store();
        let session = store.create().unwrap();
        store.begin_authorization(&session.id, "once".to_string()).unwrap();
        store
            .complete_authorization(&session.id, "once", AccessToken::new("a"))
            .unwrap();

        let err = store
            .complete_authorization(&session.id, "once", AccessToken::new("b"))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn abandon_clears_pending_state() {
        let store = store();
        let session = store.create().unwrap();
        store.begin_authorization(&session.id, "s".to_string()).unwrap();
        let session = store.abandon_authorization(&session.id).unwrap();
        assert_eq!(session.state, AuthState::Unauthenticated);
        assert!(store
            .complete_authorization(&session.id, "s", AccessToken::new("t"))
            .is_err());
    }

    #[test]
    fn expired_sessions_disappear() {
        let store = SessionStore::new(Connection::open_in_memory().unwrap(), Duration::zero()).unwrap();
        let session = store.create().unwrap();
        assert!(store.load(&session.id).unwrap().is_none());
        assert!(matches!(
            store.begin_authorization(&session.id, "s".to_string()),
            Err(SessionError::NotFound { .. })
        ));
    }

    #[test]
    fn purge_removes_only_expired_rows() {
        let live = store();
        live.create().unwrap();
        assert_eq!(live.purge_expired().unwrap(), 0);

        let dead = SessionStore::new(Connection::open_in_memory().unwrap(), Duration::zero()).unwrap();
        dead.create().unwrap();
        dead.create().unwrap();
        assert_eq!(dead.purge_expired().unwrap(), 2);
    }

    #[test]
    fn delete_logs_out() {
        let store = store();
        let session = store.create().unwrap();
        store.delete(&session.id).unwrap();
        assert!(store.load(&session.id).unwrap().is_none());
        assert!(matches!(store.delete(&session.id), Err(SessionError::NotFound { .. })));
    }

    #[test]
    fn unknown_session_is_none() {
        assert!(store().load("no-such-id").unwrap().is_none());
    }
}
