//! Time-bound caching of GET responses.
//!
//! This module provides the in-process request cache used by the executor:
//! - Entries are keyed by the endpoint string the caller passed (query included)
//! - Expiry is lazy: an entry older than the TTL is dropped when it is read
//! - Eviction by substring pattern, or a full clear
//! - An optional entry bound that evicts the oldest entry on insert

mod request_cache;

pub use request_cache::{CacheEntry, RequestCache, DEFAULT_TTL};
