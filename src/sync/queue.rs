//! Remote operations recorded while offline and replayed on the next cycle.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use super::store::LocalStore;

/// Storage key of the pending operation queue.
pub const QUEUE_KEY: &str = "sync_queue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PendingOp {
  /// Delete a record the local side no longer has
  Delete {
    table: String,
    id: String,
    #[serde(rename = "queuedAt")]
    queued_at: i64,
  },
}

pub fn load_queue(store: &dyn LocalStore) -> Result<Vec<PendingOp>> {
  match store.get_item(QUEUE_KEY)? {
    Some(raw) => serde_json::from_str(&raw).map_err(|e| eyre!("Corrupt sync queue: {}", e)),
    None => Ok(Vec::new()),
  }
}

/// Persist the queue. An empty queue removes the key.
pub fn save_queue(store: &dyn LocalStore, ops: &[PendingOp]) -> Result<()> {
  if ops.is_empty() {
    return store.remove_item(QUEUE_KEY);
  }

  let raw = serde_json::to_string(ops).map_err(|e| eyre!("Failed to serialize sync queue: {}", e))?;
  store.set_item(QUEUE_KEY, &raw)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::store::MemoryStore;

  #[test]
  fn test_queue_wire_format() {
    let store = MemoryStore::new();
    let op = PendingOp::Delete {
      table: "payments".to_string(),
      id: "pay_001".to_string(),
      queued_at: 1730412000000,
    };
    save_queue(&store, &[op.clone()]).unwrap();

    let raw: serde_json::Value =
      serde_json::from_str(&store.get_item(QUEUE_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(
      raw,
      serde_json::json!([{
        "action": "delete",
        "table": "payments",
        "id": "pay_001",
        "queuedAt": 1730412000000i64
      }])
    );
    assert_eq!(load_queue(&store).unwrap(), vec![op]);
  }

  #[test]
  fn test_empty_queue_removes_key() {
    let store = MemoryStore::new();
    store.set_item(QUEUE_KEY, "[]").unwrap();

    save_queue(&store, &[]).unwrap();

    assert_eq!(store.get_item(QUEUE_KEY).unwrap(), None);
    assert!(load_queue(&store).unwrap().is_empty());
  }
}
