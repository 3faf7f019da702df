//! Socket seam: opening a connection yields a pair of channels.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
  /// A text frame
  Message(String),
  /// A protocol or I/O error; a `Closed` event follows
  Error(String),
  /// The connection is gone, normally or not
  Closed,
}

/// An open connection. Dropping `outbound` closes the socket.
pub struct SocketConnection {
  pub outbound: mpsc::UnboundedSender<String>,
  pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
  /// Open a socket to `url`. An error means the socket never opened.
  async fn open(&self, url: &str) -> Result<SocketConnection>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
  async fn open(&self, url: &str) -> Result<SocketConnection> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
      .await
      .map_err(|e| eyre!("Failed to open websocket: {}", e))?;
    let (mut sink, mut stream) = socket.split();

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound) = mpsc::unbounded_channel::<SocketEvent>();

    tokio::spawn(async move {
      while let Some(text) = outbound_rx.recv().await {
        if let Err(e) = sink.send(Message::Text(text)).await {
          warn!(error = %e, "websocket write failed");
          break;
        }
      }
      let _ = sink.close().await;
    });

    tokio::spawn(async move {
      while let Some(frame) = stream.next().await {
        match frame {
          Ok(Message::Text(text)) => {
            if inbound_tx.send(SocketEvent::Message(text)).is_err() {
              return;
            }
          }
          Ok(Message::Close(_)) => break,
          // Pings are answered by tungstenite; binary frames are not part of the protocol
          Ok(_) => {}
          Err(e) => {
            let _ = inbound_tx.send(SocketEvent::Error(e.to_string()));
            break;
          }
        }
      }
      let _ = inbound_tx.send(SocketEvent::Closed);
    });

    Ok(SocketConnection { outbound, inbound })
  }
}
