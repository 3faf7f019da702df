//! Request executor: interception, dispatch, normalization and GET caching.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::auth::AuthProvider;
use crate::cache::RequestCache;
use crate::config::ApiConfig;

use super::envelope::{Method, ResponseEnvelope};
use super::mock::MockResponder;
use super::transport::{FileUpload, HttpRequest, ReqwestTransport, RequestBody, Transport};

/// Where requests end up once they leave the executor.
#[derive(Clone)]
pub enum Dispatch {
  /// Real network I/O through a transport
  Network(Arc<dyn Transport>),
  /// Synthesized responses, no I/O at all
  Mock(MockResponder),
}

/// Request body as handed over by callers.
#[derive(Debug, Clone)]
pub enum Payload {
  Json(Value),
  Upload(FileUpload),
}

impl From<Value> for Payload {
  fn from(value: Value) -> Self {
    Payload::Json(value)
  }
}

/// Per-call knobs.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  /// Go to the network even if a fresh cached GET response exists
  pub skip_cache: bool,
  /// Do not add the JSON `Content-Type` and XHR marker headers.
  /// Required for multipart uploads, where the transport sets its own boundary.
  pub suppress_default_headers: bool,
  /// Extra headers sent with the request
  pub headers: Vec<(String, String)>,
}

impl RequestOptions {
  pub fn skip_cache() -> Self {
    Self {
      skip_cache: true,
      ..Self::default()
    }
  }

  pub fn multipart() -> Self {
    Self {
      suppress_default_headers: true,
      ..Self::default()
    }
  }
}

/// Builds and issues requests, always answering with a [`ResponseEnvelope`].
///
/// Cloning is cheap: clones share the transport, the auth provider and the
/// response cache.
#[derive(Clone)]
pub struct RequestExecutor {
  base_url: String,
  dispatch: Dispatch,
  auth: Arc<dyn AuthProvider>,
  cache: RequestCache<ResponseEnvelope>,
}

impl RequestExecutor {
  pub fn new(
    base_url: impl Into<String>,
    dispatch: Dispatch,
    auth: Arc<dyn AuthProvider>,
    cache: RequestCache<ResponseEnvelope>,
  ) -> Self {
    let base_url = base_url.into().trim_end_matches('/').to_string();
    Self {
      base_url,
      dispatch,
      auth,
      cache,
    }
  }

  /// Build an executor from configuration. Mock mode never touches the network.
  pub fn from_config(config: &ApiConfig, auth: Arc<dyn AuthProvider>) -> color_eyre::Result<Self> {
    let dispatch = if config.mock_mode {
      Dispatch::Mock(MockResponder::new())
    } else {
      Dispatch::Network(Arc::new(ReqwestTransport::new(config.request_timeout())?))
    };

    let cache = RequestCache::new()
      .with_ttl(config.cache_ttl())
      .with_max_entries(config.cache_max_entries);

    Ok(Self::new(config.base_url.clone(), dispatch, auth, cache))
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn is_mock(&self) -> bool {
    matches!(self.dispatch, Dispatch::Mock(_))
  }

  /// The shared GET response cache.
  pub fn cache(&self) -> &RequestCache<ResponseEnvelope> {
    &self.cache
  }

  /// Absolute URLs pass through, relative endpoints get the base URL prefix.
  pub fn resolve_url(&self, endpoint: &str) -> String {
    if endpoint.starts_with("http") {
      endpoint.to_string()
    } else {
      format!("{}{}", self.base_url, endpoint)
    }
  }

  /// Issue one request. Never fails: transport errors come back as an
  /// unsuccessful envelope.
  pub async fn execute(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Payload>,
    options: RequestOptions,
  ) -> ResponseEnvelope {
    if method == Method::Get && !options.skip_cache {
      if let Some(cached) = self.cache.get(endpoint) {
        debug!(endpoint, "cache hit");
        return cached;
      }
    }

    let result = self.dispatch(method, endpoint, body, &options).await;

    if method == Method::Get && result.success {
      self.cache.set(endpoint, result.clone());
    }

    result
  }

  async fn dispatch(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Payload>,
    options: &RequestOptions,
  ) -> ResponseEnvelope {
    let headers = match self.intercept(options).await {
      Ok(headers) => headers,
      Err(e) => {
        error!(method = %method, endpoint, error = %e, "request interception failed");
        return ResponseEnvelope::connection_failure(&e.to_string());
      }
    };

    let body = if method.has_body() { body } else { None };

    match &self.dispatch {
      Dispatch::Mock(mock) => {
        let echoed = body.as_ref().map(|b| match b {
          Payload::Json(value) => value.clone(),
          Payload::Upload(upload) => serde_json::json!({
            "file": upload.file_name,
            "folder": upload.folder,
          }),
        });
        mock.respond(method, endpoint, echoed.as_ref()).await
      }
      Dispatch::Network(transport) => {
        let body = match body {
          Some(Payload::Json(value)) => match serde_json::to_vec(&value) {
            Ok(bytes) => Some(RequestBody::Json(bytes)),
            Err(e) => {
              error!(method = %method, endpoint, error = %e, "failed to serialize body");
              return ResponseEnvelope::connection_failure(&e.to_string());
            }
          },
          Some(Payload::Upload(upload)) => Some(RequestBody::Multipart(upload)),
          None => None,
        };

        let request = HttpRequest {
          method,
          url: self.resolve_url(endpoint),
          headers,
          body,
        };

        match transport.send(request).await {
          Ok(response) => ResponseEnvelope::from_http(response.status, &response.body),
          Err(e) => {
            error!(method = %method, endpoint, error = %e, "request failed");
            ResponseEnvelope::connection_failure(&e.to_string())
          }
        }
      }
    }
  }

  /// Header set for one request: caller extras, bearer token when a session
  /// exists, then the JSON defaults unless suppressed.
  async fn intercept(&self, options: &RequestOptions) -> color_eyre::Result<Vec<(String, String)>> {
    let mut headers = options.headers.clone();

    if self.auth.is_authenticated() {
      if let Some(token) = self.auth.session_token().await? {
        headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
      }
    }

    if !options.suppress_default_headers {
      headers.push(("Content-Type".to_string(), "application/json".to_string()));
      headers.push(("X-Requested-With".to_string(), "XMLHttpRequest".to_string()));
    }

    Ok(headers)
  }

  pub async fn get(&self, endpoint: &str) -> ResponseEnvelope {
    self
      .execute(Method::Get, endpoint, None, RequestOptions::default())
      .await
  }

  pub async fn post(&self, endpoint: &str, body: impl Into<Payload>) -> ResponseEnvelope {
    self
      .execute(Method::Post, endpoint, Some(body.into()), RequestOptions::default())
      .await
  }

  pub async fn put(&self, endpoint: &str, body: impl Into<Payload>) -> ResponseEnvelope {
    self
      .execute(Method::Put, endpoint, Some(body.into()), RequestOptions::default())
      .await
  }

  pub async fn patch(&self, endpoint: &str, body: impl Into<Payload>) -> ResponseEnvelope {
    self
      .execute(Method::Patch, endpoint, Some(body.into()), RequestOptions::default())
      .await
  }

  pub async fn delete(&self, endpoint: &str) -> ResponseEnvelope {
    self
      .execute(Method::Delete, endpoint, None, RequestOptions::default())
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::envelope::CONNECTION_ERROR;
  use crate::api::testing::{executor_with, FakeTransport};
  use crate::auth::{Anonymous, StaticToken};
  use color_eyre::eyre::eyre;
  use serde_json::json;

  #[tokio::test]
  async fn test_transport_error_without_message_becomes_connection_error() {
    let transport = FakeTransport::new(|_| Err(eyre!("")));
    let api = executor_with(transport.clone(), Arc::new(Anonymous));

    let env = api.get("/residents").await;

    assert!(!env.success);
    assert_eq!(env.error(), Some(CONNECTION_ERROR));
    assert_eq!(env.status, None);
  }

  #[tokio::test]
  async fn test_transport_error_message_is_kept() {
    let transport = FakeTransport::new(|_| Err(eyre!("connection refused")));
    let api = executor_with(transport, Arc::new(Anonymous));

    let env = api.post("/residents", json!({"name": "Ana"})).await;

    assert_eq!(env.error(), Some("connection refused"));
  }

  #[tokio::test]
  async fn test_get_is_served_from_cache_within_ttl() {
    let transport = FakeTransport::json(200, json!([{"id": "res_001"}]));
    let api = executor_with(transport.clone(), Arc::new(Anonymous));

    let first = api.get("/residents?tenantId=t1").await;
    let second = api.get("/residents?tenantId=t1").await;

    assert!(first.success);
    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_skip_cache_goes_to_network() {
    let transport = FakeTransport::json(200, json!([]));
    let api = executor_with(transport.clone(), Arc::new(Anonymous));

    api.get("/payments").await;
    api
      .execute(Method::Get, "/payments", None, RequestOptions::skip_cache())
      .await;

    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_failed_get_is_not_cached() {
    let transport = FakeTransport::json(503, json!({"message": "Servicio no disponible"}));
    let api = executor_with(transport.clone(), Arc::new(Anonymous));

    let env = api.get("/payments").await;
    api.get("/payments").await;

    assert_eq!(env.error(), Some("Servicio no disponible"));
    assert_eq!(transport.calls(), 2);
    assert!(api.cache().is_empty());
  }

  #[tokio::test]
  async fn test_writes_are_never_cached() {
    let transport = FakeTransport::json(200, json!({"ok": true}));
    let api = executor_with(transport.clone(), Arc::new(Anonymous));

    api.put("/residents/res_001", json!({"unit": "305"})).await;
    api.put("/residents/res_001", json!({"unit": "305"})).await;

    assert_eq!(transport.calls(), 2);
    assert!(api.cache().is_empty());
  }

  #[tokio::test]
  async fn test_default_headers_and_bearer_token() {
    let transport = FakeTransport::json(200, json!({}));
    let api = executor_with(transport.clone(), Arc::new(StaticToken::new("tok-123")));

    api.get("/users").await;

    let request = transport.last_request().unwrap();
    assert_eq!(request.header("authorization"), Some("Bearer tok-123"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("x-requested-with"), Some("XMLHttpRequest"));
  }

  #[tokio::test]
  async fn test_anonymous_requests_carry_no_authorization() {
    let transport = FakeTransport::json(200, json!({}));
    let api = executor_with(transport.clone(), Arc::new(Anonymous));

    api.get("/users").await;

    assert_eq!(transport.last_request().unwrap().header("authorization"), None);
  }

  #[tokio::test]
  async fn test_multipart_suppresses_json_headers_but_keeps_auth() {
    let transport = FakeTransport::json(200, json!({"fileId": "f1"}));
    let api = executor_with(transport.clone(), Arc::new(StaticToken::new("tok")));

    let upload = FileUpload {
      file_name: "acta.pdf".to_string(),
      content_type: Some("application/pdf".to_string()),
      bytes: vec![1, 2, 3],
      folder: "general".to_string(),
    };
    api
      .execute(
        Method::Post,
        "/files/upload",
        Some(Payload::Upload(upload)),
        RequestOptions::multipart(),
      )
      .await;

    let request = transport.last_request().unwrap();
    assert_eq!(request.header("content-type"), None);
    assert_eq!(request.header("x-requested-with"), None);
    assert_eq!(request.header("authorization"), Some("Bearer tok"));
    assert!(matches!(request.body, Some(RequestBody::Multipart(_))));
  }

  #[tokio::test]
  async fn test_body_only_sent_for_write_verbs() {
    let transport = FakeTransport::json(200, json!({}));
    let api = executor_with(transport.clone(), Arc::new(Anonymous));

    api
      .execute(
        Method::Delete,
        "/files/f1",
        Some(json!({"ignored": true}).into()),
        RequestOptions::default(),
      )
      .await;
    assert!(transport.last_request().unwrap().body.is_none());

    api.patch("/residents/res_001", json!({"unit": "1"})).await;
    match transport.last_request().unwrap().body {
      Some(RequestBody::Json(bytes)) => {
        let sent: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(sent, json!({"unit": "1"}));
      }
      other => panic!("unexpected body: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_endpoint_resolution() {
    let transport = FakeTransport::json(200, json!({}));
    let api = executor_with(transport.clone(), Arc::new(Anonymous));

    api.delete("/users/u1").await;
    assert_eq!(
      transport.last_request().unwrap().url,
      "https://api.example.test/users/u1"
    );

    api.delete("https://files.example.test/raw/1").await;
    assert_eq!(
      transport.last_request().unwrap().url,
      "https://files.example.test/raw/1"
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_mock_mode_always_succeeds_without_network() {
    let api = RequestExecutor::new(
      "https://api.example.test",
      Dispatch::Mock(MockResponder::new()),
      Arc::new(Anonymous),
      RequestCache::new(),
    );

    for (method, endpoint) in [
      (Method::Get, "/residents?tenantId=t1"),
      (Method::Post, "/payments/pay_001/process"),
      (Method::Put, "/nowhere"),
      (Method::Delete, "https://elsewhere.test/x"),
    ] {
      let env = api
        .execute(method, endpoint, Some(json!({"a": 1}).into()), RequestOptions::default())
        .await;
      assert!(env.success);
      assert_eq!(env.status, Some(200));
    }

    assert!(api.is_mock());
    assert!(api.cache().get("/residents?tenantId=t1").is_some());
  }
}
