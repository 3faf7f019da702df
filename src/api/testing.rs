//! Test doubles for the transport seam.

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::auth::AuthProvider;
use crate::cache::RequestCache;

use super::executor::{Dispatch, RequestExecutor};
use super::transport::{HttpRequest, HttpResponse, Transport};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync;

/// Transport that records every request and answers through a closure.
#[derive(Clone)]
pub struct FakeTransport {
  handler: Arc<Handler>,
  requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl FakeTransport {
  pub fn new<F>(handler: F) -> Self
  where
    F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
  {
    Self {
      handler: Arc::new(handler),
      requests: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Answer every request with the same status and JSON body.
  pub fn json(status: u16, body: Value) -> Self {
    Self::new(move |_| Ok(respond(status, &body)))
  }

  pub fn calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn last_request(&self) -> Option<HttpRequest> {
    self.requests.lock().unwrap().last().cloned()
  }
}

#[async_trait]
impl Transport for FakeTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
    self.requests.lock().unwrap().push(request.clone());
    (self.handler)(&request)
  }
}

pub fn respond(status: u16, body: &Value) -> HttpResponse {
  HttpResponse {
    status,
    body: serde_json::to_vec(body).unwrap(),
  }
}

pub fn executor_with(transport: FakeTransport, auth: Arc<dyn AuthProvider>) -> RequestExecutor {
  RequestExecutor::new(
    "https://api.example.test",
    Dispatch::Network(Arc::new(transport)),
    auth,
    RequestCache::new(),
  )
}
