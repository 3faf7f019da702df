//! Deterministic stand-in for the backend when no API is configured.
//!
//! Routes are evaluated in insertion order and the first predicate that
//! matches the endpoint supplies the payload. Anything unmatched gets an echo
//! of the request, so mock mode never reports a failure.

use rand::Rng;
use serde_json::{json, Value};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::envelope::{Method, ResponseEnvelope};

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type Generator = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Clone)]
struct MockRoute {
  predicate: Predicate,
  generator: Generator,
}

/// Synthesizes successful responses with artificial latency.
#[derive(Clone)]
pub struct MockResponder {
  routes: Vec<MockRoute>,
  /// Latency bounds in milliseconds, sampled uniformly per call
  latency_ms: RangeInclusive<u64>,
}

impl MockResponder {
  /// Responder with the built-in canned resources and 100-500ms latency.
  pub fn new() -> Self {
    let mut responder = Self::empty();
    for (pattern, generator) in canned_resources() {
      responder = responder.with_route(move |endpoint| endpoint.contains(pattern), generator);
    }
    responder
  }

  /// Responder with no routes; every call echoes the request.
  pub fn empty() -> Self {
    Self {
      routes: Vec::new(),
      latency_ms: 100..=500,
    }
  }

  /// Append a route. It is only consulted if no earlier route matched.
  pub fn with_route<P, G>(mut self, predicate: P, generator: G) -> Self
  where
    P: Fn(&str) -> bool + Send + Sync + 'static,
    G: Fn() -> Value + Send + Sync + 'static,
  {
    self.routes.push(MockRoute {
      predicate: Arc::new(predicate),
      generator: Arc::new(generator),
    });
    self
  }

  /// Override the latency bounds.
  pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
    let min = min.as_millis() as u64;
    let max = (max.as_millis() as u64).max(min);
    self.latency_ms = min..=max;
    self
  }

  /// Payload for an endpoint, without latency.
  pub fn payload(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Value {
    self
      .routes
      .iter()
      .find(|route| (route.predicate)(endpoint))
      .map(|route| (route.generator)())
      .unwrap_or_else(|| {
        json!({
          "message": "Mock response",
          "endpoint": endpoint,
          "method": method.as_str(),
          "data": body.cloned().unwrap_or(Value::Null),
        })
      })
  }

  /// Wait for the simulated network delay, then answer with a 200 envelope.
  pub async fn respond(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<&Value>,
  ) -> ResponseEnvelope {
    let delay = {
      let mut rng = rand::thread_rng();
      rng.gen_range(self.latency_ms.clone())
    };
    tokio::time::sleep(Duration::from_millis(delay)).await;

    debug!(method = %method, endpoint, delay_ms = delay, "mock response");
    ResponseEnvelope::ok(self.payload(method, endpoint, body), 200)
  }
}

impl Default for MockResponder {
  fn default() -> Self {
    Self::new()
  }
}

// ============================================================================
// Canned resources
// ============================================================================

fn canned_resources() -> Vec<(&'static str, fn() -> Value)> {
  vec![
    ("/users", mock_users),
    ("/residents", mock_residents),
    ("/payments", mock_payments),
    ("/maintenance", mock_maintenance),
    ("/properties", mock_properties),
    ("/clients", mock_clients),
    ("/security/access-logs", mock_access_logs),
    ("/security/visitors", mock_visitors),
    ("/security/incidents", mock_incidents),
    ("/communications", mock_communications),
  ]
}

fn mock_users() -> Value {
  json!([
    {"id": "user_001", "name": "Juan Pérez", "email": "juan.perez@email.com", "role": "admin", "status": "active", "createdAt": "2024-01-15"},
    {"id": "user_002", "name": "María González", "email": "maria.gonzalez@email.com", "role": "user", "status": "active", "createdAt": "2024-02-20"}
  ])
}

fn mock_residents() -> Value {
  json!([
    {"id": "res_001", "name": "Carlos Martínez", "email": "carlos.martinez@email.com", "unit": "304", "phone": "+52 55 1234 5678", "status": "active"},
    {"id": "res_002", "name": "Ana López", "email": "ana.lopez@email.com", "unit": "507", "phone": "+52 55 9876 5432", "status": "active"}
  ])
}

fn mock_payments() -> Value {
  json!([
    {"id": "pay_001", "residentId": "res_001", "amount": 5200, "concept": "Mantenimiento Octubre", "status": "paid", "dueDate": "2024-10-31", "paidDate": "2024-10-28"},
    {"id": "pay_002", "residentId": "res_002", "amount": 5200, "concept": "Mantenimiento Octubre", "status": "pending", "dueDate": "2024-10-31", "paidDate": null}
  ])
}

fn mock_maintenance() -> Value {
  json!([
    {"id": "maint_001", "title": "Revisión Elevador", "description": "Mantenimiento preventivo mensual", "priority": "medium", "status": "completed", "assignedTo": "Técnico López"},
    {"id": "maint_002", "title": "Reparación Plomería", "description": "Fuga en tubería principal", "priority": "urgent", "status": "in-progress", "assignedTo": "Plomero García"}
  ])
}

fn mock_properties() -> Value {
  json!([
    {"id": "prop_001", "title": "Casa Moderna en Polanco", "price": 8500000, "bedrooms": 4, "bathrooms": 3, "area": 350, "status": "available", "location": "Polanco, CDMX"},
    {"id": "prop_002", "title": "Departamento de Lujo", "price": 4200000, "bedrooms": 2, "bathrooms": 2, "area": 120, "status": "sold", "location": "Santa Fe, CDMX"}
  ])
}

fn mock_clients() -> Value {
  json!([
    {"id": "client_001", "name": "Roberto Martínez", "email": "roberto.martinez@email.com", "interest": "Casa", "budget": 8000000, "status": "active"},
    {"id": "client_002", "name": "Ana Fernández", "email": "ana.fernandez@email.com", "interest": "Departamento", "budget": 4500000, "status": "prospect"}
  ])
}

fn mock_access_logs() -> Value {
  json!([
    {"id": "log_001", "userId": "res_001", "userName": "Carlos Martínez", "action": "entry", "location": "Entrada Principal", "timestamp": "2024-10-31 22:45:00", "status": "authorized"},
    {"id": "log_002", "userId": "vis_001", "userName": "Visitante - María García", "action": "entry_attempt", "location": "Lobby", "timestamp": "2024-10-31 22:30:00", "status": "pending"}
  ])
}

fn mock_visitors() -> Value {
  json!([
    {"id": "vis_001", "name": "María García", "visiting": "Carlos Martínez - Depto 304", "purpose": "Visita familiar", "status": "authorized", "entryTime": "2024-10-31 20:30:00"},
    {"id": "vis_002", "name": "Pedro Rodríguez", "visiting": "Ana López - Depto 507", "purpose": "Entrega de paquete", "status": "pending", "entryTime": null}
  ])
}

fn mock_incidents() -> Value {
  json!([
    {"id": "inc_001", "title": "Ruido excesivo", "priority": "medium", "status": "resolved", "reportedBy": "Residente Depto 203", "createdAt": "2024-10-30 23:15:00"},
    {"id": "inc_002", "title": "Vehículo sospechoso", "priority": "high", "status": "investigating", "reportedBy": "Guardia de Seguridad", "createdAt": "2024-10-31 21:45:00"}
  ])
}

fn mock_communications() -> Value {
  json!([
    {"id": "comm_001", "title": "Corte de agua programado", "channel": "email", "audience": "all", "status": "sent", "sentAt": "2024-10-30 09:00:00"},
    {"id": "comm_002", "title": "Asamblea de condóminos", "channel": "push", "audience": "owners", "status": "scheduled", "sentAt": null}
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_known_resource_returns_canned_payload() {
    let mock = MockResponder::new();
    let env = mock
      .respond(Method::Get, "/residents?tenantId=t1", None)
      .await;

    assert!(env.success);
    assert_eq!(env.status, Some(200));
    assert_eq!(env.data().and_then(|d| d[0]["id"].as_str()), Some("res_001"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_unknown_endpoint_echoes_request() {
    let mock = MockResponder::new();
    let body = json!({"reportType": "monthly"});
    let env = mock
      .respond(Method::Post, "/reports/generate", Some(&body))
      .await;

    assert!(env.success);
    assert_eq!(env.status, Some(200));
    let data = env.data().unwrap();
    assert_eq!(data["message"], "Mock response");
    assert_eq!(data["endpoint"], "/reports/generate");
    assert_eq!(data["method"], "POST");
    assert_eq!(data["data"], body);
  }

  #[test]
  fn test_first_matching_route_wins() {
    // "/users" is registered before "/residents"
    let mock = MockResponder::new();
    let payload = mock.payload(Method::Get, "/users/residents", None);
    assert_eq!(payload[0]["id"], "user_001");

    let custom = MockResponder::empty()
      .with_route(|e| e.contains("/a"), || json!("first"))
      .with_route(|e| e.contains("/a/b"), || json!("second"));
    assert_eq!(custom.payload(Method::Get, "/a/b", None), json!("first"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_latency_within_bounds() {
    let mock = MockResponder::empty();
    let start = tokio::time::Instant::now();
    mock.respond(Method::Delete, "/files/f1", None).await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed <= Duration::from_millis(500));
  }

  #[tokio::test(start_paused = true)]
  async fn test_every_method_succeeds() {
    let mock = MockResponder::new().with_latency(Duration::ZERO, Duration::ZERO);
    for method in [
      Method::Get,
      Method::Post,
      Method::Put,
      Method::Patch,
      Method::Delete,
    ] {
      let env = mock.respond(method, "/anything/at/all", None).await;
      assert!(env.success);
      assert_eq!(env.status, Some(200));
    }
  }
}
