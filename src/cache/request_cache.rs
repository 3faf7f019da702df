//! In-memory request cache with lazy TTL expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default time-to-live for cached responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached value together with the moment it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub value: V,
  pub stored_at: Instant,
}

/// Shared, time-bound key/value store for GET responses.
///
/// Cloning is cheap and every clone sees the same entries. There is no
/// background sweep: expiry is only checked when an entry is read.
pub struct RequestCache<V> {
  entries: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
  /// How long an entry stays valid after it was stored
  ttl: Duration,
  /// Optional upper bound on the number of entries
  max_entries: Option<usize>,
}

impl<V: Clone> RequestCache<V> {
  /// Create an unbounded cache with the default five minute TTL.
  pub fn new() -> Self {
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
      ttl: DEFAULT_TTL,
      max_entries: None,
    }
  }

  /// Set the time-to-live for cached entries.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Bound the cache to `max_entries`.
  ///
  /// This goes beyond plain lazy expiry: once the bound is reached, storing a
  /// new key evicts the entry with the oldest `stored_at`.
  pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
    self.max_entries = max_entries.filter(|max| *max > 0);
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn is_expired(&self, stored_at: Instant) -> bool {
    Instant::now().duration_since(stored_at) > self.ttl
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
    // A panic while holding the lock cannot leave a half-written entry behind
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Return the cached value if it is still within the TTL window.
  ///
  /// An expired entry is removed as a side effect.
  pub fn get(&self, key: &str) -> Option<V> {
    let mut entries = self.lock();

    let expired = match entries.get(key) {
      Some(entry) if !self.is_expired(entry.stored_at) => return Some(entry.value.clone()),
      Some(_) => true,
      None => false,
    };

    if expired {
      entries.remove(key);
    }
    None
  }

  /// Store a value, overwriting any previous entry and stamping the current time.
  pub fn set(&self, key: impl Into<String>, value: V) {
    let key = key.into();
    let mut entries = self.lock();

    if let Some(max) = self.max_entries {
      if !entries.contains_key(&key) && entries.len() >= max {
        let oldest = entries
          .iter()
          .min_by_key(|(_, entry)| entry.stored_at)
          .map(|(k, _)| k.clone());
        if let Some(oldest) = oldest {
          entries.remove(&oldest);
        }
      }
    }

    entries.insert(
      key,
      CacheEntry {
        value,
        stored_at: Instant::now(),
      },
    );
  }

  /// Remove every entry whose key contains `pattern`, or everything when no
  /// pattern is given. Returns the number of removed entries.
  pub fn invalidate(&self, pattern: Option<&str>) -> usize {
    let mut entries = self.lock();
    let before = entries.len();

    match pattern {
      Some(pattern) => entries.retain(|key, _| !key.contains(pattern)),
      None => entries.clear(),
    }

    before - entries.len()
  }

  /// Number of stored entries, expired ones included.
  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<V: Clone> Default for RequestCache<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V> Clone for RequestCache<V> {
  fn clone(&self) -> Self {
    Self {
      entries: Arc::clone(&self.entries),
      ttl: self.ttl,
      max_entries: self.max_entries,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_get_within_ttl_returns_value() {
    let cache = RequestCache::new();
    cache.set("/residents?tenantId=t1", "cached".to_string());

    tokio::time::advance(Duration::from_secs(299)).await;

    assert_eq!(cache.get("/residents?tenantId=t1"), Some("cached".to_string()));
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_is_removed_on_read() {
    let cache = RequestCache::new().with_ttl(Duration::from_secs(10));
    cache.set("/payments", 1u32);

    tokio::time::advance(Duration::from_secs(11)).await;

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("/payments"), None);
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_set_restamps_existing_entry() {
    let cache = RequestCache::new().with_ttl(Duration::from_secs(10));
    cache.set("/users", 1u32);

    tokio::time::advance(Duration::from_secs(8)).await;
    cache.set("/users", 2u32);
    tokio::time::advance(Duration::from_secs(8)).await;

    assert_eq!(cache.get("/users"), Some(2));
  }

  #[test]
  fn test_invalidate_by_substring() {
    let cache = RequestCache::new();
    cache.set("/residents?tenantId=t1", 1u32);
    cache.set("/residents/res_001", 2u32);
    cache.set("/payments?tenantId=t1", 3u32);

    let removed = cache.invalidate(Some("residents"));

    assert_eq!(removed, 2);
    assert_eq!(cache.get("/residents?tenantId=t1"), None);
    assert_eq!(cache.get("/residents/res_001"), None);
    assert_eq!(cache.get("/payments?tenantId=t1"), Some(3));
  }

  #[test]
  fn test_invalidate_matches_anywhere_in_key() {
    let cache = RequestCache::new();
    cache.set("/residents?tenantId=t1", 1u32);
    cache.set("/payments?tenantId=t2", 2u32);

    cache.invalidate(Some("tenantId=t1"));

    assert_eq!(cache.get("/residents?tenantId=t1"), None);
    assert_eq!(cache.get("/payments?tenantId=t2"), Some(2));
  }

  #[test]
  fn test_invalidate_without_pattern_clears_all() {
    let cache = RequestCache::new();
    cache.set("/a", 1u32);
    cache.set("/b", 2u32);

    assert_eq!(cache.invalidate(None), 2);
    assert!(cache.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_bounded_cache_evicts_oldest() {
    let cache = RequestCache::new().with_max_entries(Some(2));
    cache.set("/a", 1u32);
    tokio::time::advance(Duration::from_millis(5)).await;
    cache.set("/b", 2u32);
    tokio::time::advance(Duration::from_millis(5)).await;
    cache.set("/c", 3u32);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("/a"), None);
    assert_eq!(cache.get("/b"), Some(2));
    assert_eq!(cache.get("/c"), Some(3));
  }

  #[test]
  fn test_bounded_cache_overwrite_does_not_evict() {
    let cache = RequestCache::new().with_max_entries(Some(2));
    cache.set("/a", 1u32);
    cache.set("/b", 2u32);
    cache.set("/a", 10u32);

    assert_eq!(cache.get("/a"), Some(10));
    assert_eq!(cache.get("/b"), Some(2));
  }

  #[test]
  fn test_clones_share_entries() {
    let cache = RequestCache::new();
    let other = cache.clone();
    cache.set("/shared", 7u32);

    assert_eq!(other.get("/shared"), Some(7));
  }
}
