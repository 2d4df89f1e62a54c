//! Local persistence for the sync client.
//!
//! `SQLite` holds three things that must survive a restart while the service
//! is unreachable: the read-through cache of service responses, the queue of
//! writes waiting to be replayed, and a log of batches saved locally.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Prefix of every cache key.
pub const CACHE_KEY_PREFIX: &str = "qg";

/// Deterministic key for a cached dataset.
///
/// The key is `qg_<dataset>_<params>` where `<params>` is the JSON
/// serialization of the parameters with object keys in sorted order, so
/// equal parameters always produce the same key regardless of field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    dataset: String,
    key: String,
}

impl CacheKey {
    /// Build the key for `dataset` requested with `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` cannot be serialized to JSON.
    pub fn new(dataset: impl Into<String>, params: &impl Serialize) -> Result<Self> {
        let dataset = dataset.into();
        // serde_json::Value keeps object keys in a BTreeMap, so going through
        // it sorts them.
        let value = serde_json::to_value(params)?;
        let key = format!(
            "{CACHE_KEY_PREFIX}_{dataset}_{}",
            serde_json::to_string(&value)?
        );
        Ok(Self { dataset, key })
    }

    /// Name of the dataset.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// The full key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// A cached response body with the time it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    /// Raw JSON text as received.
    pub data: String,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

/// Kind of write held in the offline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Save a measurement batch.
    Save,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Save => write!(f, "save"),
        }
    }
}

/// A write waiting for the service to come back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Queue position. Lower ids were enqueued first.
    pub id: i64,
    /// What the write does.
    pub kind: OperationKind,
    /// JSON request body.
    pub payload: String,
    /// When the write was queued.
    pub enqueued_at: DateTime<Utc>,
}

/// Storage engine for the sync client.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a response body under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cache_put(&self, key: &CacheKey, data: &str) -> Result<()> {
        self.conn.execute(
            r"
            INSERT OR REPLACE INTO cache (key, dataset, data, stored_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![key.as_str(), key.dataset(), data, Utc::now().to_rfc3339()],
        )?;
        debug!(key = %key, "Cached response");
        Ok(())
    }

    /// Look up the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cache_get(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT data, stored_at FROM cache WHERE key = ?1",
                [key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(data, stored_at)| CachedEntry {
            data,
            stored_at: parse_timestamp(&stored_at),
        }))
    }

    /// Number of cached entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cache_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Append a write to the offline queue and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn enqueue(&self, kind: OperationKind, payload: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO offline_queue (kind, payload, enqueued_at) VALUES (?1, ?2, ?3)",
            params![kind.to_string(), payload, Utc::now().to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Queued {} operation with id {}", kind, id);
        Ok(id)
    }

    /// All queued writes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn queue_entries(&self) -> Result<Vec<QueueEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, payload, enqueued_at FROM offline_queue ORDER BY id ASC",
        )?;

        let entries = stmt
            .query_map([], Self::row_to_queue_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Number of queued writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn queue_len(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM offline_queue", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove a queued write after it was delivered.
    ///
    /// Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_queue_entry(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM offline_queue WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Keep a local copy of a batch saved while offline.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn store_local_batch(&self, queue_id: i64, payload: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO local_batches (queue_id, payload, stored_at) VALUES (?1, ?2, ?3)",
            params![queue_id, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Mark the batches delivered by queue entry `queue_id` as synced.
    ///
    /// Returns the number of batches updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_batch_synced(&self, queue_id: i64) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE local_batches SET synced = 1 WHERE queue_id = ?1",
            [queue_id],
        )?;
        Ok(affected)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let cached_entries = self.cache_count()?;
        let queued_writes = self.queue_len()?;
        let (local_batches, unsynced_batches): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(synced = 0), 0) FROM local_batches",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let oldest: Option<String> = self
            .conn
            .query_row(
                "SELECT enqueued_at FROM offline_queue ORDER BY id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            cached_entries,
            queued_writes,
            oldest_queued: oldest.as_deref().map(parse_timestamp),
            local_batches,
            unsynced_batches,
            db_size_bytes,
        })
    }

    fn row_to_queue_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
        let id: i64 = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let enqueued_at: String = row.get(3)?;

        let kind = match kind_str.as_str() {
            "save" => OperationKind::Save,
            _ => {
                warn!("Unknown queued operation: {}, treating as save", kind_str);
                OperationKind::Save
            }
        };

        Ok(QueueEntry {
            id,
            kind,
            payload,
            enqueued_at: parse_timestamp(&enqueued_at),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

/// Statistics about the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Number of cached responses.
    pub cached_entries: i64,
    /// Writes waiting to be replayed.
    pub queued_writes: i64,
    /// When the oldest queued write was made.
    pub oldest_queued: Option<DateTime<Utc>>,
    /// Batches saved locally.
    pub local_batches: i64,
    /// Locally saved batches not yet delivered.
    pub unsynced_batches: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_cache_key_format() {
        let key = CacheKey::new("historical", &json!({"dateRange": "7d"})).unwrap();
        assert_eq!(key.as_str(), r#"qg_historical_{"dateRange":"7d"}"#);
        assert_eq!(key.dataset(), "historical");
    }

    #[test]
    fn test_cache_key_ignores_field_order() {
        let a = CacheKey::new("historical", &json!({"dateRange": "7d", "productType": "X"}));
        let b = CacheKey::new("historical", &json!({"productType": "X", "dateRange": "7d"}));
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn test_cache_key_distinguishes_params() {
        let a = CacheKey::new("historical", &json!({"dateRange": "7d"})).unwrap();
        let b = CacheKey::new("historical", &json!({"dateRange": "30d"})).unwrap();
        let c = CacheKey::new("predictions", &json!({"dateRange": "7d"})).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cache_put_and_get() {
        let storage = create_test_storage();
        let key = CacheKey::new("historical", &json!({"dateRange": "7d"})).unwrap();

        assert!(storage.cache_get(&key).unwrap().is_none());

        storage.cache_put(&key, r#"{"trends":[1,2,3]}"#).unwrap();
        let entry = storage.cache_get(&key).unwrap().unwrap();
        assert_eq!(entry.data, r#"{"trends":[1,2,3]}"#);
        assert_eq!(storage.cache_count().unwrap(), 1);
    }

    #[test]
    fn test_cache_put_overwrites() {
        let storage = create_test_storage();
        let key = CacheKey::new("historical", &json!({})).unwrap();

        storage.cache_put(&key, "1").unwrap();
        storage.cache_put(&key, "2").unwrap();

        assert_eq!(storage.cache_get(&key).unwrap().unwrap().data, "2");
        assert_eq!(storage.cache_count().unwrap(), 1);
    }

    #[test]
    fn test_queue_is_fifo() {
        let storage = create_test_storage();
        let first = storage.enqueue(OperationKind::Save, "a").unwrap();
        let second = storage.enqueue(OperationKind::Save, "b").unwrap();
        let third = storage.enqueue(OperationKind::Save, "c").unwrap();

        let entries = storage.queue_entries().unwrap();
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first, second, third]);
        let payloads: Vec<&str> = entries.iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, vec!["a", "b", "c"]);
        assert!(entries.iter().all(|e| e.kind == OperationKind::Save));
    }

    #[test]
    fn test_remove_queue_entry() {
        let storage = create_test_storage();
        let id = storage.enqueue(OperationKind::Save, "{}").unwrap();

        assert_eq!(storage.queue_len().unwrap(), 1);
        assert!(storage.remove_queue_entry(id).unwrap());
        assert!(!storage.remove_queue_entry(id).unwrap());
        assert_eq!(storage.queue_len().unwrap(), 0);
    }

    #[test]
    fn test_queue_ids_not_reused_after_removal() {
        let storage = create_test_storage();
        let first = storage.enqueue(OperationKind::Save, "a").unwrap();
        storage.remove_queue_entry(first).unwrap();
        let second = storage.enqueue(OperationKind::Save, "b").unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_local_batches_and_stats() {
        let storage = create_test_storage();
        let q1 = storage.enqueue(OperationKind::Save, "a").unwrap();
        let q2 = storage.enqueue(OperationKind::Save, "b").unwrap();
        storage.store_local_batch(q1, "a").unwrap();
        storage.store_local_batch(q2, "b").unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.local_batches, 2);
        assert_eq!(stats.unsynced_batches, 2);
        assert_eq!(stats.queued_writes, 2);
        assert!(stats.oldest_queued.is_some());

        assert_eq!(storage.mark_batch_synced(q1).unwrap(), 1);
        let stats = storage.stats().unwrap();
        assert_eq!(stats.unsynced_batches, 1);
    }

    #[test]
    fn test_stats_empty() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();

        assert_eq!(stats.cached_entries, 0);
        assert_eq!(stats.queued_writes, 0);
        assert_eq!(stats.local_batches, 0);
        assert_eq!(stats.unsynced_batches, 0);
        assert!(stats.oldest_queued.is_none());
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_queue_survives_reopen() {
        let db_path =
            std::env::temp_dir().join(format!("qualityguard_queue_test_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&db_path);

        {
            let storage = Storage::open(&db_path).unwrap();
            storage.enqueue(OperationKind::Save, "pending").unwrap();
            assert_eq!(storage.path(), db_path);
        }

        let storage = Storage::open(&db_path).unwrap();
        let entries = storage.queue_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, "pending");
        assert!(storage.stats().unwrap().db_size_bytes > 0);

        drop(storage);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let nested_path = std::env::temp_dir().join(format!(
            "qualityguard_test_{}/nested/db.sqlite",
            std::process::id()
        ));

        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }

        let storage = Storage::open(&nested_path).unwrap();
        assert!(nested_path.exists());

        drop(storage);
        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent.parent().unwrap());
        }
    }
}
