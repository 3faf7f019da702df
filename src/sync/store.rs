//! Local durable key/value storage and per-table snapshots.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::record::SyncRecord;

/// String-valued key/value storage that survives restarts.
pub trait LocalStore: Send + Sync {
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  fn set_item(&self, key: &str, value: &str) -> Result<()>;

  fn remove_item(&self, key: &str) -> Result<()>;
}

/// Storage key holding the snapshot of `table`.
pub fn snapshot_key(table: &str) -> String {
  format!("offline_{}", table)
}

/// Read the snapshot of a table. A missing snapshot is an empty table.
pub fn load_snapshot(store: &dyn LocalStore, table: &str) -> Result<Vec<SyncRecord>> {
  match store.get_item(&snapshot_key(table))? {
    Some(raw) => serde_json::from_str(&raw)
      .map_err(|e| eyre!("Corrupt snapshot for table {}: {}", table, e)),
    None => Ok(Vec::new()),
  }
}

/// Replace the snapshot of a table wholesale.
pub fn save_snapshot(store: &dyn LocalStore, table: &str, records: &[SyncRecord]) -> Result<()> {
  let raw = serde_json::to_string(records)
    .map_err(|e| eyre!("Failed to serialize snapshot for table {}: {}", table, e))?;
  store.set_item(&snapshot_key(table), &raw)
}

/// Storage key of the time of the last fully successful sync cycle.
pub const LAST_SYNC_KEY: &str = "last_sync_timestamp";

/// Time of the last fully successful sync cycle, if any.
pub fn load_last_sync(store: &dyn LocalStore) -> Result<Option<DateTime<Utc>>> {
  let Some(raw) = store.get_item(LAST_SYNC_KEY)? else {
    return Ok(None);
  };

  let millis: i64 = raw
    .trim()
    .parse()
    .map_err(|e| eyre!("Corrupt {}: {}", LAST_SYNC_KEY, e))?;
  Ok(DateTime::from_timestamp_millis(millis))
}

/// Stored as epoch milliseconds.
pub fn save_last_sync(store: &dyn LocalStore, at: DateTime<Utc>) -> Result<()> {
  store.set_item(LAST_SYNC_KEY, &at.timestamp_millis().to_string())
}

/// In-process storage, lost on exit.
#[derive(Default)]
pub struct MemoryStore {
  items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl LocalStore for MemoryStore {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(items.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.remove(key);
    Ok(())
  }
}

/// SQLite-backed storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open local store at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Store that lives only as long as the process.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("condoconnect").join("offline.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run local store migrations: {}", e))?;

    Ok(())
  }
}

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl LocalStore for SqliteStore {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM local_storage WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO local_storage (key, value, stored_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM local_storage WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove {}: {}", key, e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Vec<SyncRecord> {
    vec![
      SyncRecord::new("res_001").updated(10).field("unit", "304"),
      SyncRecord::new("res_002").field("unit", "507"),
    ]
  }

  #[test]
  fn test_missing_snapshot_is_empty() {
    let store = MemoryStore::new();
    assert!(load_snapshot(&store, "residents").unwrap().is_empty());
  }

  #[test]
  fn test_snapshot_uses_namespaced_key() {
    let store = MemoryStore::new();
    save_snapshot(&store, "payments", &sample()).unwrap();

    let raw = store.get_item("offline_payments").unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed[0]["id"], "res_001");
  }

  #[test]
  fn test_corrupt_snapshot_is_an_error() {
    let store = MemoryStore::new();
    store.set_item("offline_residents", "{not json").unwrap();

    assert!(load_snapshot(&store, "residents").is_err());
  }

  #[test]
  fn test_last_sync_round_trips_as_millis() {
    let store = MemoryStore::new();
    assert_eq!(load_last_sync(&store).unwrap(), None);

    let at = DateTime::from_timestamp_millis(1730412000123).unwrap();
    save_last_sync(&store, at).unwrap();

    assert_eq!(
      store.get_item(LAST_SYNC_KEY).unwrap().as_deref(),
      Some("1730412000123")
    );
    assert_eq!(load_last_sync(&store).unwrap(), Some(at));

    store.set_item(LAST_SYNC_KEY, "yesterday").unwrap();
    assert!(load_last_sync(&store).is_err());
  }

  #[test]
  fn test_sqlite_store_replaces_and_removes() {
    let store = SqliteStore::open_in_memory().unwrap();

    store.set_item("offline_residents", "[]").unwrap();
    store.set_item("offline_residents", "[1]").unwrap();
    assert_eq!(
      store.get_item("offline_residents").unwrap().as_deref(),
      Some("[1]")
    );

    store.remove_item("offline_residents").unwrap();
    assert_eq!(store.get_item("offline_residents").unwrap(), None);
  }

  #[test]
  fn test_sqlite_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("offline.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      save_snapshot(&store, "residents", &sample()).unwrap();
    }

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(load_snapshot(&reopened, "residents").unwrap(), sample());
  }
}
