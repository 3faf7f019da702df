//! REST client for the property-management backend.
//!
//! Layers, leaf to root:
//! - `transport`: one HTTP request on the wire (reqwest), behind a trait
//! - `mock`: canned responses used instead of the network in mock mode
//! - `executor`: header interception, dispatch, normalization into
//!   [`ResponseEnvelope`], and GET caching
//! - `domain`: resource-specific methods built on the executor

mod domain;
mod envelope;
mod executor;
mod mock;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use domain::{CondoApi, Filters};
pub use envelope::{Method, ResponseEnvelope, CONNECTION_ERROR, RESPONSE_PARSE_ERROR};
pub use executor::{Dispatch, Payload, RequestExecutor, RequestOptions};
pub use mock::MockResponder;
pub use transport::{
  FileUpload, HttpRequest, HttpResponse, RequestBody, ReqwestTransport, Transport,
  DEFAULT_UPLOAD_FOLDER,
};
