//! Periodic reconciliation of local table snapshots with the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{Method, RequestExecutor, RequestOptions};
use crate::config::SyncConfig;
use crate::realtime::RemoteUpdateSink;

use super::queue::{load_queue, save_queue, PendingOp};
use super::record::{merge, RecordSource, SyncRecord};
use super::store::{load_last_sync, load_snapshot, save_last_sync, save_snapshot, LocalStore};

/// Counters for one table that synced successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
  pub local: usize,
  pub remote: usize,
  pub merged: usize,
  pub uploaded: usize,
  pub upload_failures: usize,
}

/// Outcome of syncing one table.
#[derive(Debug, Clone)]
pub struct TableReport {
  pub table: String,
  pub outcome: std::result::Result<TableStats, String>,
}

/// Outcome of one full sync cycle, in table order.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
  /// Queued operations replayed successfully before the tables
  pub pending_applied: usize,
  /// Queued operations still waiting after this cycle
  pub pending_remaining: usize,
  pub tables: Vec<TableReport>,
}

impl SyncReport {
  pub fn table(&self, name: &str) -> Option<&TableReport> {
    self.tables.iter().find(|t| t.table == name)
  }

  pub fn failed_tables(&self) -> Vec<&str> {
    self
      .tables
      .iter()
      .filter(|t| t.outcome.is_err())
      .map(|t| t.table.as_str())
      .collect()
  }

  pub fn is_complete(&self) -> bool {
    self.tables.iter().all(|t| t.outcome.is_ok())
  }
}

/// Where the engine stands, as shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
  pub is_running: bool,
  /// End of the last cycle in which every table synced
  pub last_sync: Option<DateTime<Utc>>,
  /// Operations waiting to be replayed against the server
  pub queue_size: usize,
}

/// Out-of-band update pushed by the server for a single table.
#[derive(Debug, Deserialize)]
struct RemoteUpdate {
  table: String,
  #[serde(default)]
  record: Option<SyncRecord>,
  #[serde(default)]
  records: Vec<SyncRecord>,
}

struct Runner {
  stop_tx: watch::Sender<bool>,
}

struct Shared {
  executor: RequestExecutor,
  store: Arc<dyn LocalStore>,
  tables: Vec<String>,
  interval: Duration,
  path_prefix: String,
  runner: Mutex<Option<Runner>>,
  /// One lock per table so that cycles and update hints never interleave
  /// on the same snapshot
  table_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
  queue_lock: tokio::sync::Mutex<()>,
}

/// Keeps per-table local snapshots reconciled with the server.
///
/// `start` schedules a cycle every `interval`; `stop` prevents further cycles
/// but lets one that is already running finish. Both are idempotent.
#[derive(Clone)]
pub struct OfflineSyncEngine {
  shared: Arc<Shared>,
}

impl OfflineSyncEngine {
  pub fn new(executor: RequestExecutor, store: Arc<dyn LocalStore>, config: &SyncConfig) -> Self {
    Self {
      shared: Arc::new(Shared {
        executor,
        store,
        tables: config.tables.clone(),
        interval: config.interval(),
        path_prefix: config.path_prefix.trim_end_matches('/').to_string(),
        runner: Mutex::new(None),
        table_locks: Mutex::new(HashMap::new()),
        queue_lock: tokio::sync::Mutex::new(()),
      }),
    }
  }

  pub fn tables(&self) -> &[String] {
    &self.shared.tables
  }

  pub fn is_running(&self) -> bool {
    self
      .shared
      .runner
      .lock()
      .map(|runner| runner.is_some())
      .unwrap_or(false)
  }

  /// Begin periodic syncing. No-op when already running.
  pub fn start(&self) -> Result<()> {
    let mut runner = self
      .shared
      .runner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if runner.is_some() {
      debug!("offline sync already running");
      return Ok(());
    }

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let engine = self.clone();
    let period = self.shared.interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        tokio::select! {
          _ = ticker.tick() => {}
          _ = stop_rx.changed() => break,
        }

        // Runs to completion even if stop() is called meanwhile
        let report = engine.perform_sync().await;
        if !report.is_complete() {
          warn!(failed = ?report.failed_tables(), "sync cycle finished with failures");
        }

        if *stop_rx.borrow() {
          break;
        }
      }

      debug!("offline sync loop exited");
    });

    *runner = Some(Runner { stop_tx });
    info!(
      tables = ?self.shared.tables,
      interval_secs = period.as_secs(),
      "offline sync started"
    );
    Ok(())
  }

  /// Stop scheduling cycles. No-op when already stopped.
  pub fn stop(&self) -> Result<()> {
    let mut runner = self
      .shared
      .runner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if let Some(Runner { stop_tx }) = runner.take() {
      // The loop may already be gone; nothing left to stop then
      let _ = stop_tx.send(true);
      info!("offline sync stopped");
    }
    Ok(())
  }

  /// Running state, last successful cycle and queue length.
  pub fn sync_status(&self) -> Result<SyncStatus> {
    let store = self.shared.store.as_ref();
    Ok(SyncStatus {
      is_running: self.is_running(),
      last_sync: load_last_sync(store)?,
      queue_size: load_queue(store)?.len(),
    })
  }

  /// Run one cycle now: replay queued operations, then every table in
  /// configured order, one after the other. The cycle time is recorded only
  /// when every table synced.
  pub async fn perform_sync(&self) -> SyncReport {
    let (pending_applied, pending_remaining) = self.flush_pending().await;

    let mut report = SyncReport {
      pending_applied,
      pending_remaining,
      tables: Vec::with_capacity(self.shared.tables.len()),
    };
    for table in &self.shared.tables {
      report.tables.push(self.sync_table(table).await);
    }

    if report.is_complete() {
      if let Err(e) = save_last_sync(self.shared.store.as_ref(), Utc::now()) {
        warn!(error = %e, "failed to record sync time");
      }
    }
    report
  }

  /// Sync a single table. Failures are logged and reported, never raised.
  pub async fn sync_table(&self, table: &str) -> TableReport {
    let lock = self.table_lock(table);
    let _guard = lock.lock().await;

    let outcome = match self.try_sync_table(table).await {
      Ok(stats) => {
        info!(
          table,
          merged = stats.merged,
          uploaded = stats.uploaded,
          upload_failures = stats.upload_failures,
          "table synced"
        );
        Ok(stats)
      }
      Err(e) => {
        error!(table, error = %e, "table sync failed");
        Err(e.to_string())
      }
    };

    TableReport {
      table: table.to_string(),
      outcome,
    }
  }

  async fn try_sync_table(&self, table: &str) -> Result<TableStats> {
    let store = self.shared.store.as_ref();

    let local = load_snapshot(store, table)?;
    let remote = self.fetch_remote(table).await?;

    let mut stats = TableStats {
      local: local.len(),
      remote: remote.len(),
      ..TableStats::default()
    };

    let merged = merge(local, remote);
    stats.merged = merged.len();
    save_snapshot(store, table, &merged)?;

    for record in merged.iter().filter(|r| r.is_local()) {
      if self.upload(table, record).await {
        stats.uploaded += 1;
      } else {
        stats.upload_failures += 1;
      }
    }

    Ok(stats)
  }

  fn table_endpoint(&self, table: &str) -> String {
    format!("{}/{}", self.shared.path_prefix, table)
  }

  fn record_endpoint(&self, table: &str, id: &str) -> String {
    format!("{}/{}", self.table_endpoint(table), id)
  }

  async fn fetch_remote(&self, table: &str) -> Result<Vec<SyncRecord>> {
    let envelope = self
      .shared
      .executor
      .execute(
        Method::Get,
        &self.table_endpoint(table),
        None,
        RequestOptions::skip_cache(),
      )
      .await;

    if !envelope.success {
      return Err(eyre!(
        "Failed to fetch remote {}: {}",
        table,
        envelope.error.as_deref().unwrap_or("unknown error")
      ));
    }

    let data = envelope.data.unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(|e| eyre!("Unexpected remote data for {}: {}", table, e))
  }

  /// PUT one local record back to the server. Failures are logged only.
  async fn upload(&self, table: &str, record: &SyncRecord) -> bool {
    let endpoint = self.record_endpoint(table, &record.id);

    let body = match serde_json::to_value(record.without_source()) {
      Ok(body) => body,
      Err(e) => {
        warn!(table, id = %record.id, error = %e, "failed to encode record");
        return false;
      }
    };

    let envelope = self.shared.executor.put(&endpoint, body).await;
    if !envelope.success {
      warn!(
        table,
        id = %record.id,
        error = envelope.error.as_deref().unwrap_or("unknown error"),
        "failed to upload record"
      );
    }
    envelope.success
  }

  /// Replay queued operations. Returns (applied, still queued).
  async fn flush_pending(&self) -> (usize, usize) {
    let _guard = self.shared.queue_lock.lock().await;
    let store = self.shared.store.as_ref();

    let ops = match load_queue(store) {
      Ok(ops) => ops,
      Err(e) => {
        warn!(error = %e, "cannot read sync queue");
        return (0, 0);
      }
    };
    if ops.is_empty() {
      return (0, 0);
    }

    let mut applied = 0;
    let mut remaining = Vec::new();
    for op in ops {
      if self.apply_pending(&op).await {
        applied += 1;
      } else {
        remaining.push(op);
      }
    }

    if let Err(e) = save_queue(store, &remaining) {
      warn!(error = %e, "failed to persist sync queue");
    }
    debug!(applied, remaining = remaining.len(), "replayed sync queue");
    (applied, remaining.len())
  }

  async fn apply_pending(&self, op: &PendingOp) -> bool {
    match op {
      PendingOp::Delete { table, id, .. } => {
        let envelope = self
          .shared
          .executor
          .delete(&self.record_endpoint(table, id))
          .await;

        // Already gone on the server
        if envelope.success || envelope.status == Some(404) {
          return true;
        }
        warn!(
          table = %table,
          id = %id,
          error = envelope.error.as_deref().unwrap_or("unknown error"),
          "queued delete failed"
        );
        false
      }
    }
  }

  async fn enqueue(&self, op: PendingOp) -> Result<()> {
    let _guard = self.shared.queue_lock.lock().await;
    let store = self.shared.store.as_ref();

    let mut ops = load_queue(store)?;
    ops.push(op);
    save_queue(store, &ops)
  }

  /// Record a new local item. Without an `id` one of the form
  /// `local_<millis>_<suffix>` is generated. The item is stamped with the
  /// current time and uploaded on the next cycle.
  pub async fn add_item(&self, table: &str, mut item: Map<String, Value>) -> Result<SyncRecord> {
    let id = match item.remove("id") {
      Some(Value::String(id)) if !id.is_empty() => id,
      Some(Value::Number(n)) => n.to_string(),
      _ => generate_local_id(),
    };
    item.remove("updatedAt");
    item.remove("_source");

    let record = SyncRecord {
      id,
      updated_at: Some(Utc::now().timestamp_millis().into()),
      source: Some(RecordSource::Local),
      fields: item,
    };

    {
      let lock = self.table_lock(table);
      let _guard = lock.lock().await;
      let store = self.shared.store.as_ref();

      let mut records = load_snapshot(store, table)?;
      if records.iter().any(|r| r.id == record.id) {
        return Err(eyre!("Record {} already exists in {}", record.id, table));
      }
      records.push(record.clone());
      save_snapshot(store, table, &records)?;
    }

    debug!(table, id = %record.id, "added local item");
    self.schedule_sync();
    Ok(record)
  }

  /// Apply `updates` to a local item and stamp it with the current time.
  /// `id`, `updatedAt` and `_source` in `updates` are ignored.
  pub async fn update_item(
    &self,
    table: &str,
    id: &str,
    updates: Map<String, Value>,
  ) -> Result<SyncRecord> {
    let updated = {
      let lock = self.table_lock(table);
      let _guard = lock.lock().await;
      let store = self.shared.store.as_ref();

      let mut records = load_snapshot(store, table)?;
      let record = records
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| eyre!("Record {} not found in {}", id, table))?;

      for (key, value) in updates {
        if !matches!(key.as_str(), "id" | "updatedAt" | "_source") {
          record.fields.insert(key, value);
        }
      }
      record.updated_at = Some(Utc::now().timestamp_millis().into());
      record.source = Some(RecordSource::Local);

      let updated = record.clone();
      save_snapshot(store, table, &records)?;
      updated
    };

    debug!(table, id, "updated local item");
    self.schedule_sync();
    Ok(updated)
  }

  /// Remove a local item and queue its deletion on the server. Returns
  /// false when the item is not in the snapshot.
  pub async fn delete_item(&self, table: &str, id: &str) -> Result<bool> {
    {
      let lock = self.table_lock(table);
      let _guard = lock.lock().await;
      let store = self.shared.store.as_ref();

      let mut records = load_snapshot(store, table)?;
      let before = records.len();
      records.retain(|r| r.id != id);
      if records.len() == before {
        return Ok(false);
      }
      save_snapshot(store, table, &records)?;
    }

    self
      .enqueue(PendingOp::Delete {
        table: table.to_string(),
        id: id.to_string(),
        queued_at: Utc::now().timestamp_millis(),
      })
      .await?;

    debug!(table, id, "deleted local item");
    self.schedule_sync();
    Ok(true)
  }

  /// Run a cycle in the background right away when the periodic loop is on.
  fn schedule_sync(&self) {
    if !self.is_running() {
      return;
    }

    let engine = self.clone();
    tokio::spawn(async move {
      let report = engine.perform_sync().await;
      if !report.is_complete() {
        warn!(failed = ?report.failed_tables(), "sync after local change finished with failures");
      }
    });
  }

  /// Merge records pushed by the server into a table snapshot, without
  /// re-uploading anything. Returns the number of records that were applied.
  pub async fn handle_remote_update(&self, data: Value) -> Result<usize> {
    let update: RemoteUpdate =
      serde_json::from_value(data).map_err(|e| eyre!("Malformed data update: {}", e))?;

    let mut incoming = update.records;
    if let Some(record) = update.record {
      incoming.push(record);
    }
    if incoming.is_empty() {
      return Ok(0);
    }

    let lock = self.table_lock(&update.table);
    let _guard = lock.lock().await;

    let store = self.shared.store.as_ref();
    let local = load_snapshot(store, &update.table)?;
    let merged = merge(local, incoming);
    let applied = merged.iter().filter(|r| !r.is_local()).count();
    save_snapshot(store, &update.table, &merged)?;

    debug!(table = %update.table, applied, "applied remote update");
    Ok(applied)
  }

  fn table_lock(&self, table: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self
      .shared
      .table_locks
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    Arc::clone(locks.entry(table.to_string()).or_default())
  }
}

fn generate_local_id() -> String {
  let suffix: String = rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(9)
    .map(|c| char::from(c).to_ascii_lowercase())
    .collect();
  format!("local_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[async_trait]
impl RemoteUpdateSink for OfflineSyncEngine {
  async fn apply_remote_update(&self, data: Value) {
    if let Err(e) = self.handle_remote_update(data).await {
      warn!(error = %e, "dropping data update");
    }
  }
}
