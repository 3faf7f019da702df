//! Realtime push channel.
//!
//! The channel authenticates with the session token, dispatches inbound
//! `{type, data}` frames to the notification bridge or the remote update
//! sink, and reconnects a bounded number of times with linear backoff.

mod bridge;
mod channel;
mod message;
mod socket;

pub use bridge::{LogBridge, NotificationBridge, RemoteUpdateSink};
pub use channel::{backoff_delay, socket_url, ConnectionState, MessageHandlers, RealtimeChannel};
pub use message::{InboundMessage, MessageKind};
pub use socket::{Connector, SocketConnection, SocketEvent, WebSocketConnector};
