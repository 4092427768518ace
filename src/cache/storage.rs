//! Cache storage trait and in-memory implementation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::tracker::cache::{Invalidation, QueryKey};

/// A single cached query result.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  /// Serialized query result
  pub value: Value,
  /// When the result was stored
  pub cached_at: DateTime<Utc>,
  /// Set when a mutation marked the entry stale
  pub invalidated: bool,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get the cached result for a query.
  fn get(&self, key: &QueryKey) -> Option<CachedEntry>;

  /// Store a query result, replacing any previous one.
  fn put(&self, key: &QueryKey, value: Value);

  /// Mark every entry matched by `invalidation` stale and return their keys.
  fn invalidate(&self, invalidation: &Invalidation) -> Vec<QueryKey>;

  /// Keys currently held.
  fn keys(&self) -> Vec<QueryKey>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &QueryKey) -> Option<CachedEntry> {
    None // Always miss
  }

  fn put(&self, _key: &QueryKey, _value: Value) {}

  fn invalidate(&self, _invalidation: &Invalidation) -> Vec<QueryKey> {
    Vec::new()
  }

  fn keys(&self) -> Vec<QueryKey> {
    Vec::new()
  }
}

/// Process-local storage backed by a hash map.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<QueryKey, CachedEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, CachedEntry>> {
    // A panic while holding the lock leaves plain data behind; keep using it.
    self
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &QueryKey) -> Option<CachedEntry> {
    self.entries().get(key).cloned()
  }

  fn put(&self, key: &QueryKey, value: Value) {
    self.entries().insert(
      key.clone(),
      CachedEntry {
        value,
        cached_at: Utc::now(),
        invalidated: false,
      },
    );
  }

  fn invalidate(&self, invalidation: &Invalidation) -> Vec<QueryKey> {
    let mut entries = self.entries();
    let touched = entries
      .iter_mut()
      .filter(|(key, _)| invalidation.matches(key))
      .map(|(key, entry)| {
        entry.invalidated = true;
        key.clone()
      })
      .collect();
    touched
  }

  fn keys(&self) -> Vec<QueryKey> {
    let mut keys: Vec<QueryKey> = self.entries().keys().cloned().collect();
    keys.sort();
    keys
  }
}
