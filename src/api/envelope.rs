//! Uniform result shape returned by every network operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error text used when a transport failure carries no message.
pub const CONNECTION_ERROR: &str = "Error de conexión";

/// Error text used when a response body is not valid JSON.
pub const RESPONSE_PARSE_ERROR: &str = "Error procesando respuesta";

/// HTTP verbs understood by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  /// Whether a request with this verb carries a body.
  pub fn has_body(&self) -> bool {
    matches!(self, Method::Post | Method::Put | Method::Patch)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Success/data/error/status wrapper.
///
/// `data` is meaningful when `success` is true, `error` when it is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<u16>,
}

impl ResponseEnvelope {
  pub fn ok(data: Value, status: u16) -> Self {
    Self {
      success: true,
      data: Some(data),
      error: None,
      status: Some(status),
    }
  }

  pub fn failure(error: impl Into<String>, status: Option<u16>) -> Self {
    Self {
      success: false,
      data: None,
      error: Some(error.into()),
      status,
    }
  }

  /// Normalize a raw HTTP response.
  ///
  /// 2xx with a JSON body is a success; any other status uses the body's
  /// `message` field or `Error <status>`. A body that is not JSON is a failure
  /// regardless of status.
  pub fn from_http(status: u16, body: &[u8]) -> Self {
    let parsed: Value = match serde_json::from_slice(body) {
      Ok(v) => v,
      Err(_) => return Self::failure(RESPONSE_PARSE_ERROR, Some(status)),
    };

    if (200..300).contains(&status) {
      Self::ok(parsed, status)
    } else {
      let message = parsed
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("Error {}", status));
      Self::failure(message, Some(status))
    }
  }

  /// Envelope for a request that never produced a response.
  pub fn connection_failure(message: &str) -> Self {
    let message = message.trim();
    if message.is_empty() {
      Self::failure(CONNECTION_ERROR, None)
    } else {
      Self::failure(message, None)
    }
  }

  pub fn data(&self) -> Option<&Value> {
    if self.success {
      self.data.as_ref()
    } else {
      None
    }
  }

  pub fn error(&self) -> Option<&str> {
    if self.success {
      None
    } else {
      self.error.as_deref()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_success_status_range() {
    let env = ResponseEnvelope::from_http(201, br#"{"id":"res_001"}"#);
    assert!(env.success);
    assert_eq!(env.status, Some(201));
    assert_eq!(env.data(), Some(&json!({"id": "res_001"})));
    assert_eq!(env.error(), None);
  }

  #[test]
  fn test_error_uses_body_message() {
    let env = ResponseEnvelope::from_http(403, br#"{"message":"Acceso denegado"}"#);
    assert!(!env.success);
    assert_eq!(env.error(), Some("Acceso denegado"));
    assert_eq!(env.status, Some(403));
  }

  #[test]
  fn test_error_without_message_uses_status() {
    let env = ResponseEnvelope::from_http(500, br#"{"detail":"boom"}"#);
    assert_eq!(env.error(), Some("Error 500"));
  }

  #[test]
  fn test_unparseable_body() {
    let env = ResponseEnvelope::from_http(200, b"<html>gateway</html>");
    assert!(!env.success);
    assert_eq!(env.error(), Some(RESPONSE_PARSE_ERROR));
    assert_eq!(env.status, Some(200));
  }

  #[test]
  fn test_connection_failure_fallback_message() {
    assert_eq!(
      ResponseEnvelope::connection_failure("").error(),
      Some(CONNECTION_ERROR)
    );
    assert_eq!(
      ResponseEnvelope::connection_failure("connection refused").error(),
      Some("connection refused")
    );
  }

  #[test]
  fn test_serialized_shape_omits_absent_fields() {
    let env = ResponseEnvelope::failure("Error 404", Some(404));
    let value = serde_json::to_value(&env).unwrap();
    assert_eq!(value, json!({"success": false, "error": "Error 404", "status": 404}));
  }
}
