//! SQLite-backed authorization store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use calshare_core::{AuthState, AuthStatus, ChatId, TokenSet};

use crate::error::{StoreError, StoreResult};

/// Raw column values of one `auth_state` row, before invariant checks.
struct RawRow {
    chat_id: i64,
    status: String,
    nonce: Option<String>,
    nonce_issued_at: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expiry: Option<String>,
}

/// Durable per-identity authorization store.
///
/// All operations are atomic with respect to a single identity row: `put`
/// replaces the full row in one statement, `get`/`find_by_nonce` read it in
/// one statement. The single connection behind a mutex serializes access.
pub struct AuthStore {
    conn: Mutex<Connection>,
}

impl AuthStore {
    /// Opens (or creates) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        // A put that returned Ok must survive a crash: WAL for concurrent
        // readers, FULL sync so the commit is on disk before we return.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        info!(path = %path.as_ref().display(), "authorization store opened");
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_state (
                chat_id INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                nonce TEXT UNIQUE,
                nonce_issued_at TEXT,
                access_token TEXT,
                refresh_token TEXT,
                token_expiry TEXT,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Returns the authorization state for an identity, or `None` if the
    /// identity has never been seen.
    pub fn get(&self, chat_id: ChatId) -> StoreResult<Option<AuthState>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .prepare(
                "SELECT chat_id, status, nonce, nonce_issued_at,
                        access_token, refresh_token, token_expiry
                 FROM auth_state WHERE chat_id = ?1",
            )?
            .query_row(params![chat_id.as_i64()], read_raw_row)
            .optional()?;

        row.map(decode_row).transpose()
    }

    /// Upserts the full state row for an identity (last writer wins).
    ///
    /// When this returns `Ok`, the row is durably committed. A nonce
    /// collision with another identity's outstanding grant fails the write
    /// instead of touching the other row.
    pub fn put(&self, chat_id: ChatId, state: &AuthState) -> StoreResult<()> {
        let (nonce, nonce_issued_at, access_token, refresh_token, token_expiry) = match state {
            AuthState::Unauthorized => (None, None, None, None, None),
            AuthState::PendingGrant { nonce, issued_at } => (
                Some(nonce.as_str()),
                Some(issued_at.to_rfc3339()),
                None,
                None,
                None,
            ),
            AuthState::Authorized { tokens } => (
                None,
                None,
                Some(tokens.access_token.as_str()),
                Some(tokens.refresh_token.as_str()),
                Some(tokens.expires_at.to_rfc3339()),
            ),
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO auth_state
                 (chat_id, status, nonce, nonce_issued_at,
                  access_token, refresh_token, token_expiry, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(chat_id) DO UPDATE SET
                 status = excluded.status,
                 nonce = excluded.nonce,
                 nonce_issued_at = excluded.nonce_issued_at,
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 token_expiry = excluded.token_expiry,
                 updated_at = excluded.updated_at",
            params![
                chat_id.as_i64(),
                state.status().as_str(),
                nonce,
                nonce_issued_at,
                access_token,
                refresh_token,
                token_expiry,
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!(chat_id = %chat_id, status = %state.status(), "state persisted");
        Ok(())
    }

    /// Looks up the identity holding an outstanding nonce.
    ///
    /// Returns `None` for unknown nonces. TTL expiry is the caller's
    /// policy; the store only performs the correlation lookup.
    pub fn find_by_nonce(&self, nonce: &str) -> StoreResult<Option<(ChatId, AuthState)>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .prepare(
                "SELECT chat_id, status, nonce, nonce_issued_at,
                        access_token, refresh_token, token_expiry
                 FROM auth_state WHERE nonce = ?1",
            )?
            .query_row(params![nonce], read_raw_row)
            .optional()?;

        match row {
            Some(raw) => {
                let chat_id = ChatId(raw.chat_id);
                Ok(Some((chat_id, decode_row(raw)?)))
            }
            None => Ok(None),
        }
    }
}

fn read_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        chat_id: row.get(0)?,
        status: row.get(1)?,
        nonce: row.get(2)?,
        nonce_issued_at: row.get(3)?,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_expiry: row.get(6)?,
    })
}

/// Rebuilds an [`AuthState`] from raw columns, enforcing the state
/// invariants: a pending grant carries a nonce, an authorized record
/// carries the complete token set, and nothing else is representable.
fn decode_row(raw: RawRow) -> StoreResult<AuthState> {
    let status = AuthStatus::parse(&raw.status)
        .ok_or_else(|| StoreError::corrupt(raw.chat_id, format!("unknown status {:?}", raw.status)))?;

    match status {
        AuthStatus::Unauthorized => Ok(AuthState::Unauthorized),
        AuthStatus::PendingGrant => {
            let nonce = raw
                .nonce
                .ok_or_else(|| StoreError::corrupt(raw.chat_id, "pending grant without nonce"))?;
            let issued_at = parse_timestamp(raw.chat_id, raw.nonce_issued_at, "nonce_issued_at")?;
            Ok(AuthState::PendingGrant { nonce, issued_at })
        }
        AuthStatus::Authorized => {
            // Both tokens or nothing; a half-written token set must never
            // surface as a usable state.
            let (access_token, refresh_token) = match (raw.access_token, raw.refresh_token) {
                (Some(a), Some(r)) => (a, r),
                _ => {
                    return Err(StoreError::corrupt(
                        raw.chat_id,
                        "authorized record with partial token set",
                    ));
                }
            };
            let expires_at = parse_timestamp(raw.chat_id, raw.token_expiry, "token_expiry")?;
            Ok(AuthState::Authorized {
                tokens: TokenSet {
                    access_token,
                    refresh_token,
                    expires_at,
                },
            })
        }
    }
}

fn parse_timestamp(
    chat_id: i64,
    value: Option<String>,
    column: &str,
) -> StoreResult<DateTime<Utc>> {
    let value = value.ok_or_else(|| StoreError::corrupt(chat_id, format!("missing {column}")))?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(chat_id, format!("bad {column}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(nonce: &str) -> AuthState {
        AuthState::PendingGrant {
            nonce: nonce.to_string(),
            issued_at: Utc::now(),
        }
    }

    fn authorized() -> AuthState {
        AuthState::Authorized {
            tokens: TokenSet::new("access-1", "refresh-1", 3600),
        }
    }

    #[test]
    fn get_unknown_identity() {
        let store = AuthStore::in_memory().unwrap();
        assert!(store.get(ChatId(1)).unwrap().is_none());
    }

    #[test]
    fn put_get_roundtrip_all_states() {
        let store = AuthStore::in_memory().unwrap();

        store.put(ChatId(1), &AuthState::Unauthorized).unwrap();
        assert_eq!(
            store.get(ChatId(1)).unwrap().unwrap(),
            AuthState::Unauthorized
        );

        let pending_state = pending("nonce-abc");
        store.put(ChatId(1), &pending_state).unwrap();
        let loaded = store.get(ChatId(1)).unwrap().unwrap();
        assert_eq!(loaded.pending_nonce(), Some("nonce-abc"));

        let auth_state = authorized();
        store.put(ChatId(1), &auth_state).unwrap();
        let loaded = store.get(ChatId(1)).unwrap().unwrap();
        let tokens = loaded.tokens().unwrap();
        assert_eq!(tokens.access_token, "access-1");
        assert_eq!(tokens.refresh_token, "refresh-1");
    }

    #[test]
    fn timestamps_survive_roundtrip() {
        let store = AuthStore::in_memory().unwrap();
        let issued_at = Utc::now() - Duration::minutes(3);
        store
            .put(
                ChatId(9),
                &AuthState::PendingGrant {
                    nonce: "n".to_string(),
                    issued_at,
                },
            )
            .unwrap();

        match store.get(ChatId(9)).unwrap().unwrap() {
            AuthState::PendingGrant {
                issued_at: loaded, ..
            } => {
                // RFC3339 roundtrip keeps sub-second precision.
                assert!((loaded - issued_at).num_milliseconds().abs() < 2);
            }
            other => panic!("expected pending grant, got {other:?}"),
        }
    }

    #[test]
    fn find_by_nonce() {
        let store = AuthStore::in_memory().unwrap();
        store.put(ChatId(10), &pending("nonce-10")).unwrap();
        store.put(ChatId(11), &pending("nonce-11")).unwrap();

        let (chat_id, state) = store.find_by_nonce("nonce-11").unwrap().unwrap();
        assert_eq!(chat_id, ChatId(11));
        assert_eq!(state.pending_nonce(), Some("nonce-11"));

        assert!(store.find_by_nonce("never-issued").unwrap().is_none());
    }

    #[test]
    fn overwrite_invalidates_previous_nonce() {
        let store = AuthStore::in_memory().unwrap();
        store.put(ChatId(1), &pending("first")).unwrap();
        store.put(ChatId(1), &pending("second")).unwrap();

        assert!(store.find_by_nonce("first").unwrap().is_none());
        assert!(store.find_by_nonce("second").unwrap().is_some());
    }

    #[test]
    fn authorizing_clears_nonce() {
        let store = AuthStore::in_memory().unwrap();
        store.put(ChatId(1), &pending("n1")).unwrap();
        store.put(ChatId(1), &authorized()).unwrap();

        assert!(store.find_by_nonce("n1").unwrap().is_none());
        assert!(store.get(ChatId(1)).unwrap().unwrap().is_authorized());
    }

    #[test]
    fn nonce_collision_rejected_not_clobbered() {
        let store = AuthStore::in_memory().unwrap();
        store.put(ChatId(1), &pending("shared")).unwrap();

        // A different identity claiming the same nonce must fail without
        // disturbing the first identity's row.
        let result = store.put(ChatId(2), &pending("shared"));
        assert!(result.is_err());

        let (chat_id, _) = store.find_by_nonce("shared").unwrap().unwrap();
        assert_eq!(chat_id, ChatId(1));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("auth.db");

        {
            let store = AuthStore::open(&db_path).unwrap();
            store.put(ChatId(42), &authorized()).unwrap();
        }

        let store = AuthStore::open(&db_path).unwrap();
        let state = store.get(ChatId(42)).unwrap().unwrap();
        assert!(state.is_authorized());
    }

    #[test]
    fn partial_token_set_surfaces_as_corrupt() {
        let store = AuthStore::in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO auth_state
                     (chat_id, status, access_token, updated_at)
                 VALUES (1, 'authorized', 'only-access', ?1)",
                params![Utc::now().to_rfc3339()],
            )
            .unwrap();
        }

        let err = store.get(ChatId(1)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { chat_id: 1, .. }));
    }
}
