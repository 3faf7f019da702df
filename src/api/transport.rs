//! Network transport seam and its reqwest implementation.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;

use super::envelope::Method;

/// A file sent as a multipart upload.
#[derive(Debug, Clone)]
pub struct FileUpload {
  pub file_name: String,
  pub content_type: Option<String>,
  pub bytes: Vec<u8>,
  /// Destination folder on the storage side
  pub folder: String,
}

/// Folder used for uploads when the caller has no preference.
pub const DEFAULT_UPLOAD_FOLDER: &str = "general";

impl FileUpload {
  /// Upload into the default folder.
  pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      file_name: file_name.into(),
      content_type: None,
      bytes,
      folder: DEFAULT_UPLOAD_FOLDER.to_string(),
    }
  }

  pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
    self.folder = folder.into();
    self
  }

  pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
    self.content_type = Some(content_type.into());
    self
  }
}

/// Body of an outgoing request.
#[derive(Debug, Clone)]
pub enum RequestBody {
  /// Serialized JSON document
  Json(Vec<u8>),
  /// Multipart form with a `file` part and a `folder` field
  Multipart(FileUpload),
}

/// A fully resolved request ready to be sent.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<RequestBody>,
}

impl HttpRequest {
  /// Look up a header value (case-insensitive name).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Raw response as received from the wire.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

/// Sends a single request. Errors are transport failures: nothing was
/// received (unreachable host, timeout, broken connection).
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

fn multipart_form(upload: FileUpload) -> Result<reqwest::multipart::Form> {
  let mut part = reqwest::multipart::Part::bytes(upload.bytes).file_name(upload.file_name);
  if let Some(content_type) = upload.content_type {
    part = part
      .mime_str(&content_type)
      .map_err(|e| eyre!("Invalid content type {}: {}", content_type, e))?;
  }

  Ok(
    reqwest::multipart::Form::new()
      .part("file", part)
      .text("folder", upload.folder),
  )
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
    let mut builder = self
      .client
      .request(to_reqwest_method(request.method), &request.url);

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    builder = match request.body {
      Some(RequestBody::Json(bytes)) => builder.body(bytes),
      Some(RequestBody::Multipart(upload)) => builder.multipart(multipart_form(upload)?),
      None => builder,
    };

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("{} {} failed: {}", request.method, request.url, e))?;

    let status = response.status().as_u16();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body: {}", e))?;

    Ok(HttpResponse {
      status,
      body: body.to_vec(),
    })
  }
}
