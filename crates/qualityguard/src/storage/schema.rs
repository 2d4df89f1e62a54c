//! `SQLite` schema definitions for the local store.

/// Read-through cache of service responses, keyed by dataset and params.
pub const CREATE_CACHE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    dataset TEXT NOT NULL,
    data TEXT NOT NULL,
    stored_at TEXT NOT NULL
)
";

/// Writes made while the service was unreachable, replayed in id order.
pub const CREATE_OFFLINE_QUEUE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS offline_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
)
";

/// Durable copy of batches saved while offline.
pub const CREATE_LOCAL_BATCHES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS local_batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_id INTEGER,
    payload TEXT NOT NULL,
    stored_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
)
";

/// Index to find a batch by the queue entry that will deliver it.
pub const CREATE_BATCH_QUEUE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_local_batches_queue ON local_batches(queue_id)
";

/// Index on `dataset` for per-dataset counts.
pub const CREATE_CACHE_DATASET_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_cache_dataset ON cache(dataset)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_CACHE_TABLE,
    CREATE_CACHE_DATASET_INDEX,
    CREATE_OFFLINE_QUEUE_TABLE,
    CREATE_LOCAL_BATCHES_TABLE,
    CREATE_BATCH_QUEUE_INDEX,
    CREATE_METADATA_TABLE,
];
