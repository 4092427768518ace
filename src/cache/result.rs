//! What a cached read hands back.

use chrono::{DateTime, Utc};

/// Data returned by [`QueryCache::fetch_or_serve`](super::QueryCache::fetch_or_serve)
/// together with where it came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the entry was stored. `None` for data loaded by this call.
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Aged entry served because the backend could not be reached.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Loaded from the backend by this call
  Network,
  /// Stored entry, younger than the stale time and not invalidated
  CacheFresh,
  /// Stored entry past its stale time; the backend was unreachable
  Offline,
}
