//! Inbound frame format: `{ "type": ..., "data": ... }`.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub data: Value,
}

/// What the channel does with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
  Notification(Value),
  DataUpdate(Value),
  SystemMessage(Value),
  Unknown(String),
}

impl InboundMessage {
  pub fn parse(text: &str) -> serde_json::Result<Self> {
    serde_json::from_str(text)
  }

  pub fn into_kind(self) -> MessageKind {
    match self.kind.as_str() {
      "notification" => MessageKind::Notification(self.data),
      "data_update" => MessageKind::DataUpdate(self.data),
      "system_message" => MessageKind::SystemMessage(self.data),
      _ => MessageKind::Unknown(self.kind),
    }
  }
}
