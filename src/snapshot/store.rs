use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::snapshot::error::{SourceError, StoreError};
use crate::snapshot::index::IndexEntry;
use crate::snapshot::loader::LoadedSnapshot;
use crate::snapshot::source::{PackageRecord, VersionSource};
use crate::status::types::Platform;

/// SQLite-backed store of per-(channel, platform) index snapshots
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        info!("Opening snapshot database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        debug!("Snapshot store ready");

        Ok(store)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Get current timestamp in milliseconds since UNIX epoch
    fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                platform TEXT NOT NULL,
                imported_at INTEGER NOT NULL,
                UNIQUE(channel, platform)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                snapshot_id INTEGER NOT NULL,
                package TEXT NOT NULL,
                version TEXT NOT NULL,
                source_version TEXT NOT NULL,
                FOREIGN KEY (snapshot_id) REFERENCES snapshots(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_lookup ON entries(snapshot_id, package)",
            [],
        )?;

        Ok(())
    }

    /// Replace the snapshot of one (channel, platform) with the given entries
    pub fn replace_snapshot(
        &self,
        channel: &str,
        platform: &Platform,
        entries: &[IndexEntry],
    ) -> Result<(), StoreError> {
        let now = Self::current_timestamp_ms();

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        Self::write_snapshot(&tx, channel, platform, entries, now)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the loaded snapshots and drop the snapshots of `unavailable`
    /// columns, all in one transaction.
    ///
    /// A column whose index could not be read this time must not keep the
    /// versions of an earlier import.
    pub fn sync_snapshots(
        &self,
        loaded: &[LoadedSnapshot],
        unavailable: &[(String, Platform)],
    ) -> Result<(), StoreError> {
        let now = Self::current_timestamp_ms();

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        for snapshot in loaded {
            Self::write_snapshot(
                &tx,
                &snapshot.channel,
                &snapshot.platform,
                &snapshot.entries,
                now,
            )?;
        }

        for (channel, platform) in unavailable {
            // Entries go with it through ON DELETE CASCADE
            let removed = tx.execute(
                "DELETE FROM snapshots WHERE channel = ?1 AND platform = ?2",
                (channel, platform.key()),
            )?;
            if removed > 0 {
                info!("Dropped stale snapshot {}/{}", channel, platform);
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn write_snapshot(
        conn: &Connection,
        channel: &str,
        platform: &Platform,
        entries: &[IndexEntry],
        now: i64,
    ) -> Result<(), StoreError> {
        let platform_key = platform.key();
        debug!(
            "Saving {} entries for {}/{}",
            entries.len(),
            channel,
            platform_key
        );

        conn.execute(
            r#"
            INSERT INTO snapshots (channel, platform, imported_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(channel, platform) DO UPDATE SET imported_at = excluded.imported_at
            "#,
            (channel, &platform_key, now),
        )?;

        let snapshot_id: i64 = conn.query_row(
            "SELECT id FROM snapshots WHERE channel = ?1 AND platform = ?2",
            (channel, &platform_key),
            |row| row.get(0),
        )?;

        conn.execute("DELETE FROM entries WHERE snapshot_id = ?1", [snapshot_id])?;

        let mut stmt = conn.prepare(
            "INSERT INTO entries (snapshot_id, package, version, source_version) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for entry in entries {
            stmt.execute((
                snapshot_id,
                &entry.package,
                &entry.record.version,
                &entry.record.source_version,
            ))?;
        }

        Ok(())
    }

    /// Configured (channel, binary platform) columns that have a snapshot
    pub fn available_columns(
        &self,
        channels: &[String],
        platforms: &[Platform],
    ) -> Result<Vec<(String, Platform)>, StoreError> {
        let stored: HashSet<(String, String)> = self.snapshot_keys()?.into_iter().collect();

        let columns = channels
            .iter()
            .flat_map(|channel| {
                platforms
                    .iter()
                    .filter(|platform| !platform.is_source())
                    .map(move |platform| (channel.clone(), platform.clone()))
            })
            .filter(|(channel, platform)| stored.contains(&(channel.clone(), platform.key())))
            .collect();
        Ok(columns)
    }

    /// (channel, platform key) pairs that have a snapshot, sorted
    pub fn snapshot_keys(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT channel, platform FROM snapshots ORDER BY channel, platform")?;
        let keys = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, String)>, _>>()?;
        Ok(keys)
    }
}

impl VersionSource for SnapshotStore {
    fn lookup(
        &self,
        package: &str,
        channel: &str,
        platform: &Platform,
    ) -> Result<Option<PackageRecord>, SourceError> {
        let platform_key = platform.key();
        let conn = self.lock_conn()?;

        let snapshot_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM snapshots WHERE channel = ?1 AND platform = ?2",
                (channel, &platform_key),
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;

        let Some(snapshot_id) = snapshot_id else {
            return Err(SourceError::Unavailable {
                channel: channel.to_string(),
                platform: platform_key,
            });
        };

        let mut stmt = conn
            .prepare(
                "SELECT version, source_version FROM entries WHERE snapshot_id = ?1 AND package = ?2",
            )
            .map_err(StoreError::from)?;
        let mut records = stmt
            .query_map((snapshot_id, package), |row| {
                Ok(PackageRecord {
                    version: row.get(0)?,
                    source_version: row.get(1)?,
                })
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(StoreError::from)?;

        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            candidates => Err(SourceError::Ambiguous {
                package: package.to_string(),
                channel: channel.to_string(),
                platform: platform_key,
                candidates,
            }),
        }
    }

    fn package_names(&self) -> Result<Vec<String>, SourceError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT package FROM entries ORDER BY package")
            .map_err(StoreError::from)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .and_then(|rows| rows.collect::<Result<Vec<String>, _>>())
            .map_err(StoreError::from)?;
        Ok(names)
    }
}
