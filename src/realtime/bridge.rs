//! Collaborators that receive dispatched realtime messages.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Native/notification side that push notifications are forwarded to.
/// Forwarding is fire-and-forget.
pub trait NotificationBridge: Send + Sync {
  fn forward(&self, payload: Value);
}

/// Receiver of server-pushed data changes (the offline sync engine).
#[async_trait]
pub trait RemoteUpdateSink: Send + Sync {
  async fn apply_remote_update(&self, data: Value);
}

/// Bridge that only logs notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBridge;

impl NotificationBridge for LogBridge {
  fn forward(&self, payload: Value) {
    info!(%payload, "notification received");
  }
}

impl NotificationBridge for mpsc::UnboundedSender<Value> {
  fn forward(&self, payload: Value) {
    if self.send(payload).is_err() {
      debug!("notification receiver is gone");
    }
  }
}
