//! Authenticated push channel with bounded, linearly backed-off reconnects.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::bridge::{NotificationBridge, RemoteUpdateSink};
use super::message::{InboundMessage, MessageKind};
use super::socket::{Connector, SocketEvent};
use crate::auth::AuthProvider;
use crate::config::RealtimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Connected,
}

/// Delay before reconnect attempt `attempt` (1-based). Saturates instead of
/// overflowing for very large bases.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
  base.saturating_mul(attempt)
}

/// Socket URL for `endpoint` carrying `token` as a query parameter.
pub fn socket_url(endpoint: &str, token: &str) -> color_eyre::Result<String> {
  let mut url = Url::parse(endpoint)
    .map_err(|e| color_eyre::eyre::eyre!("Invalid realtime endpoint {}: {}", endpoint, e))?;
  url.query_pairs_mut().append_pair("token", token);
  Ok(url.to_string())
}

/// Where dispatched messages go. Either side may be absent, in which case
/// the corresponding messages are logged and dropped.
#[derive(Clone, Default)]
pub struct MessageHandlers {
  notifications: Option<Arc<dyn NotificationBridge>>,
  updates: Option<Arc<dyn RemoteUpdateSink>>,
}

impl MessageHandlers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_notifications(mut self, bridge: Arc<dyn NotificationBridge>) -> Self {
    self.notifications = Some(bridge);
    self
  }

  pub fn with_updates(mut self, sink: Arc<dyn RemoteUpdateSink>) -> Self {
    self.updates = Some(sink);
    self
  }
}

struct LinkState {
  connection: ConnectionState,
  reconnect_attempts: u32,
  outbound: Option<mpsc::UnboundedSender<String>>,
}

struct Inner {
  endpoint: String,
  max_reconnect_attempts: u32,
  backoff_base: Duration,
  auth: Arc<dyn AuthProvider>,
  connector: Arc<dyn Connector>,
  handlers: MessageHandlers,
  link: Mutex<LinkState>,
  supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Push channel to the realtime endpoint.
///
/// A single supervisor task owns the socket for the lifetime of a
/// `connect()`. Each closure (including a socket that never opened)
/// schedules at most one reconnect; after `max_reconnect_attempts`
/// consecutive closures without a successful open the channel stays
/// disconnected until `connect()` is called again.
#[derive(Clone)]
pub struct RealtimeChannel {
  inner: Arc<Inner>,
}

impl RealtimeChannel {
  pub fn new(
    config: &RealtimeConfig,
    auth: Arc<dyn AuthProvider>,
    connector: Arc<dyn Connector>,
    handlers: MessageHandlers,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        endpoint: config.endpoint.clone(),
        max_reconnect_attempts: config.max_reconnect_attempts,
        backoff_base: config.backoff_base(),
        auth,
        connector,
        handlers,
        link: Mutex::new(LinkState {
          connection: ConnectionState::Disconnected,
          reconnect_attempts: 0,
          outbound: None,
        }),
        supervisor: Mutex::new(None),
      }),
    }
  }

  pub fn state(&self) -> ConnectionState {
    self.inner.link().connection
  }

  pub fn is_connected(&self) -> bool {
    self.state() == ConnectionState::Connected
  }

  /// Consecutive closures since the last successful open.
  pub fn reconnect_attempts(&self) -> u32 {
    self.inner.link().reconnect_attempts
  }

  /// Open the channel. An existing connection is replaced.
  pub fn connect(&self) {
    let mut supervisor = self.inner.supervisor();
    if let Some(previous) = supervisor.take() {
      previous.abort();
    }

    {
      let mut link = self.inner.link();
      link.connection = ConnectionState::Connecting;
      link.outbound = None;
    }

    let inner = Arc::clone(&self.inner);
    *supervisor = Some(tokio::spawn(async move { inner.supervise().await }));
  }

  /// Close the channel. No reconnect follows; the attempt counter is kept.
  pub fn disconnect(&self) {
    if let Some(task) = self.inner.supervisor().take() {
      task.abort();
    }

    let mut link = self.inner.link();
    link.connection = ConnectionState::Disconnected;
    link.outbound = None;
    info!("realtime channel disconnected");
  }

  /// Serialize and send a message. Returns false, dropping the message,
  /// when the socket is not open.
  pub fn send<T: Serialize>(&self, message: &T) -> bool {
    let link = self.inner.link();
    let outbound = match (&link.connection, &link.outbound) {
      (ConnectionState::Connected, Some(outbound)) => outbound,
      _ => {
        debug!("realtime socket not open, dropping outgoing message");
        return false;
      }
    };

    let text = match serde_json::to_string(message) {
      Ok(text) => text,
      Err(e) => {
        warn!(error = %e, "failed to serialize realtime message");
        return false;
      }
    };

    outbound.send(text).is_ok()
  }
}

impl Inner {
  fn link(&self) -> MutexGuard<'_, LinkState> {
    self.link.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn supervisor(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    self.supervisor.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_connection(&self, state: ConnectionState) {
    self.link().connection = state;
  }

  async fn supervise(&self) {
    loop {
      self.set_connection(ConnectionState::Connecting);

      let token = match self.auth.session_token().await {
        Ok(Some(token)) => token,
        Ok(None) => {
          error!("no session token available, realtime channel not opened");
          self.set_connection(ConnectionState::Disconnected);
          return;
        }
        Err(e) => {
          error!(error = %e, "failed to obtain session token");
          self.set_connection(ConnectionState::Disconnected);
          return;
        }
      };

      let url = match socket_url(&self.endpoint, &token) {
        Ok(url) => url,
        Err(e) => {
          error!(error = %e, "cannot build realtime socket url");
          self.set_connection(ConnectionState::Disconnected);
          return;
        }
      };

      match self.connector.open(&url).await {
        Ok(connection) => {
          {
            let mut link = self.link();
            link.connection = ConnectionState::Connected;
            link.reconnect_attempts = 0;
            link.outbound = Some(connection.outbound);
          }
          info!(endpoint = %self.endpoint, "realtime channel connected");

          self.pump(connection.inbound).await;
          info!("realtime socket closed");
        }
        Err(e) => warn!(error = %e, "realtime socket failed to open"),
      }

      let next_attempt = {
        let mut link = self.link();
        link.connection = ConnectionState::Disconnected;
        link.outbound = None;
        if link.reconnect_attempts < self.max_reconnect_attempts {
          link.reconnect_attempts += 1;
          Some(link.reconnect_attempts)
        } else {
          None
        }
      };

      match next_attempt {
        Some(attempt) => {
          let delay = backoff_delay(self.backoff_base, attempt);
          info!(
            attempt,
            max = self.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling realtime reconnect"
          );
          tokio::time::sleep(delay).await;
        }
        None => {
          warn!(
            attempts = self.max_reconnect_attempts,
            "giving up on realtime reconnects"
          );
          return;
        }
      }
    }
  }

  async fn pump(&self, mut inbound: mpsc::UnboundedReceiver<SocketEvent>) {
    while let Some(event) = inbound.recv().await {
      match event {
        SocketEvent::Message(text) => self.dispatch(&text).await,
        SocketEvent::Error(e) => error!(error = %e, "realtime socket error"),
        SocketEvent::Closed => break,
      }
    }
  }

  async fn dispatch(&self, text: &str) {
    let message = match InboundMessage::parse(text) {
      Ok(message) => message,
      Err(e) => {
        warn!(error = %e, "ignoring malformed realtime message");
        return;
      }
    };

    match message.into_kind() {
      MessageKind::Notification(payload) => match &self.handlers.notifications {
        Some(bridge) => bridge.forward(payload),
        None => debug!("no notification bridge, dropping notification"),
      },
      MessageKind::DataUpdate(data) => match &self.handlers.updates {
        Some(sink) => sink.apply_remote_update(data).await,
        None => debug!("no update sink, dropping data update"),
      },
      MessageKind::SystemMessage(data) => info!(%data, "system message"),
      MessageKind::Unknown(kind) => warn!(%kind, "unknown realtime message type"),
    }
  }
}
