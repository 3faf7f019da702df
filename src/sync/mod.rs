//! Offline synchronization of per-table snapshots.
//!
//! Each configured table is kept as a JSON snapshot in local durable storage
//! under `offline_<table>`. A sync cycle reads the snapshot, fetches the
//! remote table, merges the two with last-write-wins on `updatedAt`, replaces
//! the snapshot and re-uploads the records that are still local.
//!
//! Local edits go through the engine (`add_item`, `update_item`,
//! `delete_item`); deletions are queued under `sync_queue` and replayed at
//! the start of the next cycle.

mod engine;
mod queue;
mod record;
mod store;

pub use engine::{OfflineSyncEngine, SyncReport, SyncStatus, TableReport, TableStats};
pub use queue::{load_queue, save_queue, PendingOp, QUEUE_KEY};
pub use record::{merge, RecordSource, SyncRecord, Timestamp};
pub use store::{
  load_last_sync, load_snapshot, save_last_sync, save_snapshot, snapshot_key, LocalStore,
  MemoryStore, SqliteStore, LAST_SYNC_KEY,
};
