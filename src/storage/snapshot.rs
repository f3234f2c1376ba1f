//! Warm-start persistence for the shipment cache.
//!
//! The cache never depends on this store for correctness: every entry can be
//! rebuilt by re-fetching. A snapshot only saves the first round of provider calls
//! after a restart.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, params};

use super::cache::CacheEntry;
use crate::error::{Result, TrackError};

const SNAPSHOT_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: "CREATE TABLE IF NOT EXISTS cache_entries (
            tracking_number TEXT NOT NULL,
            tracking_type   TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            entry_json      TEXT NOT NULL,
            PRIMARY KEY (tracking_number, tracking_type)
        );
        CREATE INDEX IF NOT EXISTS idx_cache_entries_created ON cache_entries(created_at);",
}];

/// Durable backing for cache snapshots.
pub trait CacheStore: Send + Sync {
    /// Read every persisted entry.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn load(&self) -> Result<Vec<CacheEntry>>;

    /// Replace the persisted snapshot with `entries`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn save_all(&self, entries: &[CacheEntry]) -> Result<()>;
}

/// `SQLite` implementation of [`CacheStore`].
#[derive(Debug)]
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (or create) a snapshot database and run migrations.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err("open snapshot db"))?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests.
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err("open in-memory db"))?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of persisted entries.
    ///
    /// # Errors
    /// Returns an error if the count query fails.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .map_err(store_err("count entries"))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl CacheStore for SqliteCacheStore {
    fn load(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT entry_json FROM cache_entries ORDER BY created_at")
            .map_err(store_err("prepare load"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err("query entries"))?;

        let mut entries = Vec::new();
        for row in rows {
            let json = row.map_err(store_err("read row"))?;
            match serde_json::from_str::<CacheEntry>(&json) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable cache snapshot row"),
            }
        }
        Ok(entries)
    }

    fn save_all(&self, entries: &[CacheEntry]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(store_err("begin snapshot"))?;
        tx.execute("DELETE FROM cache_entries", [])
            .map_err(store_err("clear snapshot"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO cache_entries \
                     (tracking_number, tracking_type, created_at, entry_json) \
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(store_err("prepare insert"))?;
            for entry in entries {
                let json = serde_json::to_string(entry)?;
                stmt.execute(params![
                    entry.key.tracking_number,
                    entry.key.tracking_type.as_str(),
                    entry.created_at.to_rfc3339(),
                    json,
                ])
                .map_err(store_err("insert entry"))?;
            }
        }
        tx.commit().map_err(store_err("commit snapshot"))?;
        tracing::debug!(entries = entries.len(), "Cache snapshot saved");
        Ok(())
    }
}

// =============================================================================
// Migrations
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

/// Apply pending migrations, returning the resulting schema version.
fn run_migrations(conn: &mut Connection) -> Result<i32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(store_err("create schema_migrations"))?;

    let mut current: i32 = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .map_err(store_err("read schema version"))?
        .unwrap_or(0);

    for migration in SNAPSHOT_MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        let tx = conn.transaction().map_err(store_err("begin migration"))?;
        tx.execute_batch(migration.sql)
            .map_err(store_err("apply migration"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(store_err("record migration"))?;
        tx.commit().map_err(store_err("commit migration"))?;
        current = migration.version;
    }

    Ok(current)
}

fn store_err(context: &'static str) -> impl Fn(rusqlite::Error) -> TrackError {
    move |e| TrackError::Store(format!("{context}: {e}"))
}
