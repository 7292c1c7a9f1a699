//! Usage: Durable storage for the current session (secure-vault collaborator).

use crate::session::AuthSession;
use crate::shared::error::{db_err, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::now_unix_seconds;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_millis(2000);
const POOL_MAX_SIZE: u32 = 4;

/// One-slot storage for the durable copy of the session. Each read/write is
/// atomic from the caller's perspective; there are no transaction semantics
/// spanning calls.
pub trait SessionVault: Send + Sync {
    fn get(&self) -> AppResult<Option<AuthSession>>;
    fn set(&self, session: &AuthSession) -> AppResult<()>;
    fn clear(&self) -> AppResult<()>;
}

/// Process-lifetime vault; suits tests and hosts with their own persistence.
#[derive(Default)]
pub struct MemoryVault {
    slot: Mutex<Option<AuthSession>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionVault for MemoryVault {
    fn get(&self) -> AppResult<Option<AuthSession>> {
        Ok(self.slot.lock_or_recover().clone())
    }

    fn set(&self, session: &AuthSession) -> AppResult<()> {
        *self.slot.lock_or_recover() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        *self.slot.lock_or_recover() = None;
        Ok(())
    }
}

/// SQLite-backed vault storing the session as a single JSON document row.
pub struct SqliteVault {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteVault {
    pub fn open(path: &Path) -> AppResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch(
                r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
"#,
            )
        });

        let pool = Pool::builder()
            .max_size(POOL_MAX_SIZE)
            .build(manager)
            .map_err(|e| db_err!("failed to create vault pool: {e}"))?;

        let conn = pool
            .get()
            .map_err(|e| db_err!("failed to get startup connection: {e}"))?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS auth_session (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    document TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#,
        )
        .map_err(|e| db_err!("failed to create vault schema: {e}"))?;

        Ok(Self { pool })
    }

    fn open_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| db_err!("failed to get connection from pool: {e}"))
    }
}

impl SessionVault for SqliteVault {
    fn get(&self) -> AppResult<Option<AuthSession>> {
        let conn = self.open_connection()?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM auth_session WHERE slot = 0",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_err!("failed to read session: {e}"))?;

        match document {
            Some(raw) => {
                let session: AuthSession = serde_json::from_str(&raw)
                    .map_err(|e| db_err!("stored session document is invalid: {e}"))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn set(&self, session: &AuthSession) -> AppResult<()> {
        let document = serde_json::to_string(session)
            .map_err(|e| db_err!("failed to serialize session: {e}"))?;
        let conn = self.open_connection()?;
        conn.execute(
            r#"
INSERT INTO auth_session (slot, document, updated_at) VALUES (0, ?1, ?2)
ON CONFLICT(slot) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at
"#,
            rusqlite::params![document, now_unix_seconds()],
        )
        .map_err(|e| db_err!("failed to write session: {e}"))?;
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        let conn = self.open_connection()?;
        conn.execute("DELETE FROM auth_session", [])
            .map_err(|e| db_err!("failed to clear session: {e}"))?;
        Ok(())
    }
}
