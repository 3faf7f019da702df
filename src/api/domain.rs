//! Resource-specific convenience surface over the executor.
//!
//! Every method only builds a path (and query string) and hands off to
//! [`RequestExecutor`]. Tenant-scoped listings always lead with `tenantId`.

use serde_json::{json, Value};

use super::envelope::{Method, ResponseEnvelope};
use super::executor::{Payload, RequestExecutor, RequestOptions};
use super::transport::FileUpload;

const TENANT_KEY: &str = "tenantId";

/// Ordered query filters, serialized as `application/x-www-form-urlencoded`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
  pairs: Vec<(String, String)>,
}

impl Filters {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add or replace a filter, keeping the position of an existing key.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.set(key, value);
    self
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    let value = value.into();
    match self.pairs.iter_mut().find(|(k, _)| *k == key) {
      Some(existing) => existing.1 = value,
      None => self.pairs.push((key, value)),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.pairs.is_empty()
  }

  /// Filters with `key=value` placed first. A caller-supplied value for the
  /// same key wins, but the key stays in front.
  fn led_by(&self, key: &str, value: &str) -> Filters {
    let mut merged = Filters::new().with(key, value);
    for (k, v) in &self.pairs {
      merged.set(k.clone(), v.clone());
    }
    merged
  }

  pub fn to_query_string(&self) -> String {
    url::form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.pairs.iter())
      .finish()
  }

  /// Serialize a JSON object of filters (as sent in report requests).
  fn to_json(&self) -> Value {
    let map: serde_json::Map<String, Value> = self
      .pairs
      .iter()
      .map(|(k, v)| (k.clone(), Value::String(v.clone())))
      .collect();
    Value::Object(map)
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Filters {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    iter
      .into_iter()
      .fold(Filters::new(), |filters, (k, v)| filters.with(k, v))
  }
}

/// `path` with `?query` appended only when there are filters.
fn with_query(path: &str, filters: &Filters) -> String {
  if filters.is_empty() {
    path.to_string()
  } else {
    format!("{}?{}", path, filters.to_query_string())
  }
}

/// Typed access to the property-management backend.
#[derive(Clone)]
pub struct CondoApi {
  executor: RequestExecutor,
}

impl CondoApi {
  pub fn new(executor: RequestExecutor) -> Self {
    Self { executor }
  }

  pub fn executor(&self) -> &RequestExecutor {
    &self.executor
  }

  async fn list(&self, path: &str, filters: &Filters) -> ResponseEnvelope {
    self.executor.get(&with_query(path, filters)).await
  }

  async fn list_for_tenant(&self, path: &str, tenant_id: &str, filters: &Filters) -> ResponseEnvelope {
    let filters = filters.led_by(TENANT_KEY, tenant_id);
    self.executor.get(&with_query(path, &filters)).await
  }

  async fn fetch(&self, path: &str, id: &str) -> ResponseEnvelope {
    self.executor.get(&format!("{}/{}", path, id)).await
  }

  async fn create(&self, path: &str, data: Value) -> ResponseEnvelope {
    self.executor.post(path, data).await
  }

  async fn update(&self, path: &str, id: &str, data: Value) -> ResponseEnvelope {
    self.executor.put(&format!("{}/{}", path, id), data).await
  }

  async fn remove(&self, path: &str, id: &str) -> ResponseEnvelope {
    self.executor.delete(&format!("{}/{}", path, id)).await
  }

  // ==========================================================================
  // Users
  // ==========================================================================

  pub async fn get_users(&self, filters: &Filters) -> ResponseEnvelope {
    self.list("/users", filters).await
  }

  pub async fn get_user(&self, user_id: &str) -> ResponseEnvelope {
    self.fetch("/users", user_id).await
  }

  pub async fn create_user(&self, data: Value) -> ResponseEnvelope {
    self.create("/users", data).await
  }

  pub async fn update_user(&self, user_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/users", user_id, data).await
  }

  pub async fn delete_user(&self, user_id: &str) -> ResponseEnvelope {
    self.remove("/users", user_id).await
  }

  // ==========================================================================
  // Residents
  // ==========================================================================

  pub async fn get_residents(&self, tenant_id: &str, filters: &Filters) -> ResponseEnvelope {
    self.list_for_tenant("/residents", tenant_id, filters).await
  }

  pub async fn get_resident(&self, resident_id: &str) -> ResponseEnvelope {
    self.fetch("/residents", resident_id).await
  }

  pub async fn create_resident(&self, data: Value) -> ResponseEnvelope {
    self.create("/residents", data).await
  }

  pub async fn update_resident(&self, resident_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/residents", resident_id, data).await
  }

  pub async fn delete_resident(&self, resident_id: &str) -> ResponseEnvelope {
    self.remove("/residents", resident_id).await
  }

  // ==========================================================================
  // Payments
  // ==========================================================================

  pub async fn get_payments(&self, tenant_id: &str, filters: &Filters) -> ResponseEnvelope {
    self.list_for_tenant("/payments", tenant_id, filters).await
  }

  pub async fn get_payment(&self, payment_id: &str) -> ResponseEnvelope {
    self.fetch("/payments", payment_id).await
  }

  pub async fn create_payment(&self, data: Value) -> ResponseEnvelope {
    self.create("/payments", data).await
  }

  pub async fn update_payment(&self, payment_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/payments", payment_id, data).await
  }

  pub async fn delete_payment(&self, payment_id: &str) -> ResponseEnvelope {
    self.remove("/payments", payment_id).await
  }

  /// Charge a pending payment with the given method (card, transfer, ...).
  pub async fn process_payment(&self, payment_id: &str, payment_method: &str) -> ResponseEnvelope {
    self
      .executor
      .post(
        &format!("/payments/{}/process", payment_id),
        json!({ "paymentMethod": payment_method }),
      )
      .await
  }

  // ==========================================================================
  // Maintenance orders
  // ==========================================================================

  pub async fn get_maintenance_orders(&self, tenant_id: &str, filters: &Filters) -> ResponseEnvelope {
    self.list_for_tenant("/maintenance", tenant_id, filters).await
  }

  pub async fn get_maintenance_order(&self, order_id: &str) -> ResponseEnvelope {
    self.fetch("/maintenance", order_id).await
  }

  pub async fn create_maintenance_order(&self, data: Value) -> ResponseEnvelope {
    self.create("/maintenance", data).await
  }

  pub async fn update_maintenance_order(&self, order_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/maintenance", order_id, data).await
  }

  pub async fn delete_maintenance_order(&self, order_id: &str) -> ResponseEnvelope {
    self.remove("/maintenance", order_id).await
  }

  pub async fn complete_maintenance_order(&self, order_id: &str, completion: Value) -> ResponseEnvelope {
    self
      .executor
      .post(&format!("/maintenance/{}/complete", order_id), completion)
      .await
  }

  // ==========================================================================
  // Properties
  // ==========================================================================

  pub async fn get_properties(&self, filters: &Filters) -> ResponseEnvelope {
    self.list("/properties", filters).await
  }

  pub async fn get_property(&self, property_id: &str) -> ResponseEnvelope {
    self.fetch("/properties", property_id).await
  }

  pub async fn create_property(&self, data: Value) -> ResponseEnvelope {
    self.create("/properties", data).await
  }

  pub async fn update_property(&self, property_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/properties", property_id, data).await
  }

  pub async fn delete_property(&self, property_id: &str) -> ResponseEnvelope {
    self.remove("/properties", property_id).await
  }

  // ==========================================================================
  // Clients
  // ==========================================================================

  pub async fn get_clients(&self, filters: &Filters) -> ResponseEnvelope {
    self.list("/clients", filters).await
  }

  pub async fn get_client(&self, client_id: &str) -> ResponseEnvelope {
    self.fetch("/clients", client_id).await
  }

  pub async fn create_client(&self, data: Value) -> ResponseEnvelope {
    self.create("/clients", data).await
  }

  pub async fn update_client(&self, client_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/clients", client_id, data).await
  }

  pub async fn delete_client(&self, client_id: &str) -> ResponseEnvelope {
    self.remove("/clients", client_id).await
  }

  // ==========================================================================
  // Security: access logs, visitors, incidents
  // ==========================================================================

  pub async fn get_access_logs(&self, tenant_id: &str, filters: &Filters) -> ResponseEnvelope {
    self
      .list_for_tenant("/security/access-logs", tenant_id, filters)
      .await
  }

  pub async fn get_access_log(&self, log_id: &str) -> ResponseEnvelope {
    self.fetch("/security/access-logs", log_id).await
  }

  pub async fn create_access_log(&self, data: Value) -> ResponseEnvelope {
    self.create("/security/access-logs", data).await
  }

  pub async fn update_access_log(&self, log_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/security/access-logs", log_id, data).await
  }

  pub async fn delete_access_log(&self, log_id: &str) -> ResponseEnvelope {
    self.remove("/security/access-logs", log_id).await
  }

  pub async fn get_visitors(&self, tenant_id: &str, filters: &Filters) -> ResponseEnvelope {
    self
      .list_for_tenant("/security/visitors", tenant_id, filters)
      .await
  }

  pub async fn get_visitor(&self, visitor_id: &str) -> ResponseEnvelope {
    self.fetch("/security/visitors", visitor_id).await
  }

  pub async fn create_visitor(&self, data: Value) -> ResponseEnvelope {
    self.create("/security/visitors", data).await
  }

  pub async fn update_visitor(&self, visitor_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/security/visitors", visitor_id, data).await
  }

  pub async fn delete_visitor(&self, visitor_id: &str) -> ResponseEnvelope {
    self.remove("/security/visitors", visitor_id).await
  }

  pub async fn authorize_visitor(&self, visitor_id: &str, authorization: Value) -> ResponseEnvelope {
    self
      .executor
      .post(
        &format!("/security/visitors/{}/authorize", visitor_id),
        authorization,
      )
      .await
  }

  pub async fn get_incidents(&self, tenant_id: &str, filters: &Filters) -> ResponseEnvelope {
    self
      .list_for_tenant("/security/incidents", tenant_id, filters)
      .await
  }

  pub async fn get_incident(&self, incident_id: &str) -> ResponseEnvelope {
    self.fetch("/security/incidents", incident_id).await
  }

  pub async fn create_incident(&self, data: Value) -> ResponseEnvelope {
    self.create("/security/incidents", data).await
  }

  pub async fn update_incident(&self, incident_id: &str, data: Value) -> ResponseEnvelope {
    self.update("/security/incidents", incident_id, data).await
  }

  pub async fn delete_incident(&self, incident_id: &str) -> ResponseEnvelope {
    self.remove("/security/incidents", incident_id).await
  }

  // ==========================================================================
  // Files
  // ==========================================================================

  pub async fn get_files(&self, filters: &Filters) -> ResponseEnvelope {
    self.list("/files", filters).await
  }

  pub async fn get_file(&self, file_id: &str) -> ResponseEnvelope {
    self.fetch("/files", file_id).await
  }

  /// Upload a file as multipart form data. The JSON default headers are
  /// suppressed so the transport can set the multipart boundary.
  pub async fn upload_file(&self, upload: FileUpload) -> ResponseEnvelope {
    self
      .executor
      .execute(
        Method::Post,
        "/files/upload",
        Some(Payload::Upload(upload)),
        RequestOptions::multipart(),
      )
      .await
  }

  pub async fn get_file_url(&self, file_id: &str) -> ResponseEnvelope {
    self.executor.get(&format!("/files/{}/url", file_id)).await
  }

  pub async fn delete_file(&self, file_id: &str) -> ResponseEnvelope {
    self.remove("/files", file_id).await
  }

  // ==========================================================================
  // Analytics and reports
  // ==========================================================================

  pub async fn get_analytics(&self, kind: &str, filters: &Filters) -> ResponseEnvelope {
    let filters = filters.led_by("type", kind);
    self.list("/analytics", &filters).await
  }

  pub async fn generate_report(&self, report_type: &str, filters: &Filters) -> ResponseEnvelope {
    self
      .executor
      .post(
        "/reports/generate",
        json!({ "reportType": report_type, "filters": filters.to_json() }),
      )
      .await
  }

  pub async fn get_report_status(&self, report_id: &str) -> ResponseEnvelope {
    self
      .executor
      .get(&format!("/reports/{}/status", report_id))
      .await
  }

  pub async fn download_report(&self, report_id: &str) -> ResponseEnvelope {
    self
      .executor
      .get(&format!("/reports/{}/download", report_id))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testing::{executor_with, FakeTransport};
  use crate::api::transport::RequestBody;
  use crate::auth::Anonymous;
  use std::sync::Arc;

  fn api() -> (CondoApi, FakeTransport) {
    let transport = FakeTransport::json(200, json!([]));
    let api = CondoApi::new(executor_with(transport.clone(), Arc::new(Anonymous)));
    (api, transport)
  }

  fn last_url(transport: &FakeTransport) -> String {
    transport.last_request().unwrap().url
  }

  #[test]
  fn test_filters_keep_insertion_order_and_encode() {
    let filters = Filters::new()
      .with("status", "active")
      .with("unit", "304 B")
      .with("status", "inactive");

    assert_eq!(filters.to_query_string(), "status=inactive&unit=304+B");
  }

  #[test]
  fn test_tenant_leads_and_caller_value_wins() {
    let filters: Filters = [("status", "pending"), ("tenantId", "other")]
      .into_iter()
      .collect();

    let merged = filters.led_by(TENANT_KEY, "t1");

    assert_eq!(merged.to_query_string(), "tenantId=other&status=pending");
  }

  #[tokio::test]
  async fn test_tenant_scoped_listing_path() {
    let (api, transport) = api();

    api
      .get_residents("t1", &Filters::new().with("status", "active"))
      .await;
    assert_eq!(
      last_url(&transport),
      "https://api.example.test/residents?tenantId=t1&status=active"
    );

    api.get_access_logs("t9", &Filters::new()).await;
    assert_eq!(
      last_url(&transport),
      "https://api.example.test/security/access-logs?tenantId=t9"
    );
  }

  #[tokio::test]
  async fn test_global_listing_omits_empty_query() {
    let (api, transport) = api();

    api.get_users(&Filters::new()).await;
    assert_eq!(last_url(&transport), "https://api.example.test/users");

    api.get_properties(&Filters::new().with("status", "available")).await;
    assert_eq!(
      last_url(&transport),
      "https://api.example.test/properties?status=available"
    );
  }

  #[tokio::test]
  async fn test_crud_paths_and_verbs() {
    let (api, transport) = api();

    api.get_payment("pay_001").await;
    api.create_payment(json!({"amount": 5200})).await;
    api.update_maintenance_order("maint_001", json!({"status": "completed"})).await;
    api.delete_visitor("vis_002").await;

    let seen: Vec<(Method, String)> = transport
      .requests()
      .into_iter()
      .map(|r| (r.method, r.url))
      .collect();
    assert_eq!(
      seen,
      vec![
        (Method::Get, "https://api.example.test/payments/pay_001".to_string()),
        (Method::Post, "https://api.example.test/payments".to_string()),
        (Method::Put, "https://api.example.test/maintenance/maint_001".to_string()),
        (Method::Delete, "https://api.example.test/security/visitors/vis_002".to_string()),
      ]
    );
  }

  #[tokio::test]
  async fn test_process_payment_body() {
    let (api, transport) = api();

    api.process_payment("pay_002", "card").await;

    let request = transport.last_request().unwrap();
    assert_eq!(request.url, "https://api.example.test/payments/pay_002/process");
    match request.body {
      Some(RequestBody::Json(bytes)) => {
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"paymentMethod": "card"}));
      }
      other => panic!("unexpected body: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_upload_file_is_multipart_without_json_headers() {
    let (api, transport) = api();

    let upload = FileUpload::new("reglamento.pdf", vec![0x25, 0x50]).in_folder("documentos");
    api.upload_file(upload).await;

    let request = transport.last_request().unwrap();
    assert_eq!(request.url, "https://api.example.test/files/upload");
    assert_eq!(request.header("content-type"), None);
    match request.body {
      Some(RequestBody::Multipart(upload)) => assert_eq!(upload.folder, "documentos"),
      other => panic!("unexpected body: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_reports_and_analytics() {
    let (api, transport) = api();

    api
      .get_analytics("payments", &Filters::new().with("month", "10"))
      .await;
    assert_eq!(
      last_url(&transport),
      "https://api.example.test/analytics?type=payments&month=10"
    );

    api
      .generate_report("morosidad", &Filters::new().with("tenantId", "t1"))
      .await;
    match transport.last_request().unwrap().body {
      Some(RequestBody::Json(bytes)) => {
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
          body,
          json!({"reportType": "morosidad", "filters": {"tenantId": "t1"}})
        );
      }
      other => panic!("unexpected body: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_repeated_listing_hits_transport_once() {
    let (api, transport) = api();

    api.get_residents("t1", &Filters::new()).await;
    api.get_residents("t1", &Filters::new()).await;

    assert_eq!(transport.calls(), 1);
    assert!(api.executor().cache().get("/residents?tenantId=t1").is_some());
  }
}
