//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ApiResult;
use crate::tracker::cache::{Invalidation, QueryKey};

use super::storage::CacheStorage;
use super::result::CacheResult;

type Subscribers = HashMap<QueryKey, watch::Sender<u64>>;
type Generations = HashMap<QueryKey, u64>;

/// Read-through query cache shared by everything that talks to the backend.
///
/// Results are stored under [`QueryKey`]s. A result is served from cache
/// while it is younger than the stale time and no mutation has invalidated
/// it; otherwise the loader runs and its result replaces the entry.
/// Subscribers of a key are told when it is invalidated.
pub struct QueryCache {
  storage: Arc<dyn CacheStorage>,
  /// How long before cached data is considered stale
  stale_time: Duration,
  subscribers: Arc<Mutex<Subscribers>>,
  /// Invalidation count per key ever loaded, so a load that overlaps a
  /// mutation is stored already stale
  generations: Arc<Mutex<Generations>>,
}

impl QueryCache {
  /// Create a new cache with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      stale_time: Duration::minutes(5),
      subscribers: Arc::new(Mutex::new(HashMap::new())),
      generations: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, cached_at: DateTime<Utc>) -> bool {
    Utc::now() - cached_at >= self.stale_time
  }

  /// Serve `key` from cache or load it.
  ///
  /// 1. Fresh, non-invalidated entry: return it without calling `loader`
  /// 2. Otherwise run `loader` and store its result
  /// 3. If the loader cannot reach the backend and the entry only aged out
  ///    (no mutation invalidated it), return the old entry as offline data
  pub async fn fetch_or_serve<T, F, Fut>(&self, key: &QueryKey, loader: F) -> ApiResult<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
  {
    let generation = self.generation(key);
    let Some(cached) = self.storage.get(key) else {
      debug!(%key, "cache miss");
      let data = loader().await?;
      self.store(key, &data, generation)?;
      return Ok(CacheResult::from_network(data));
    };

    if !cached.invalidated && !self.is_stale(cached.cached_at) {
      match serde_json::from_value::<T>(cached.value.clone()) {
        Ok(data) => {
          debug!(%key, "cache hit");
          return Ok(CacheResult::from_cache(data, cached.cached_at));
        }
        Err(e) => warn!(%key, error = %e, "Discarding undecodable cache entry"),
      }
    }

    debug!(%key, invalidated = cached.invalidated, "cache entry stale, refetching");
    match loader().await {
      Ok(data) => {
        self.store(key, &data, generation)?;
        Ok(CacheResult::from_network(data))
      }
      Err(e) if !cached.invalidated && e.is_offline() => {
        warn!(%key, error = %e, "Backend unreachable, serving cached data");
        let data = serde_json::from_value(cached.value)?;
        Ok(CacheResult::offline(data, cached.cached_at))
      }
      Err(e) => Err(e),
    }
  }

  /// Store a loaded result. If the key was invalidated after `generation`
  /// was read, the load may predate the write, so the entry is kept stale.
  fn store<T: Serialize>(&self, key: &QueryKey, data: &T, generation: u64) -> ApiResult<()> {
    let value = serde_json::to_value(data)?;
    self.storage.put(key, value);
    if self.generation(key) != generation {
      debug!(%key, "invalidated while loading, keeping entry stale");
      self.storage.invalidate(&Invalidation::Key(key.clone()));
    }
    Ok(())
  }

  fn generation(&self, key: &QueryKey) -> u64 {
    *lock(&self.generations).entry(key.clone()).or_insert(0)
  }

  /// Mark every cached query matched by `invalidations` stale and notify
  /// its subscribers. Returns the keys that were touched.
  pub fn invalidate(&self, invalidations: &[Invalidation]) -> Vec<QueryKey> {
    let mut touched: Vec<QueryKey> = Vec::new();
    for invalidation in invalidations {
      touched.extend(self.storage.invalidate(invalidation));
      // Subscribers may be waiting on a key that was never stored.
      touched.extend(
        lock(&self.subscribers)
          .keys()
          .filter(|key| invalidation.matches(key))
          .cloned(),
      );
      for (key, generation) in lock(&self.generations).iter_mut() {
        if invalidation.matches(key) {
          *generation += 1;
        }
      }
    }
    touched.sort();
    touched.dedup();

    for key in &touched {
      self.notify(key);
    }
    debug!(count = touched.len(), "invalidated cached queries");
    touched
  }

  /// Mark every cached query stale.
  pub fn invalidate_all(&self) -> Vec<QueryKey> {
    self.invalidate(&[Invalidation::All])
  }

  /// Subscribe to changes of `key`.
  ///
  /// The received value is a counter bumped whenever the key is
  /// invalidated. Loading and storing the key leaves it unchanged.
  pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<u64> {
    lock(&self.subscribers)
      .entry(key.clone())
      .or_insert_with(|| watch::channel(0).0)
      .subscribe()
  }

  /// Keys currently held by the storage backend.
  pub fn keys(&self) -> Vec<QueryKey> {
    self.storage.keys()
  }

  fn notify(&self, key: &QueryKey) {
    if let Some(sender) = lock(&self.subscribers).get(key) {
      sender.send_modify(|version| *version += 1);
    }
  }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Clone for QueryCache {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      stale_time: self.stale_time,
      subscribers: Arc::clone(&self.subscribers),
      generations: Arc::clone(&self.generations),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{MemoryStorage, NoopStorage};
  use crate::cache::result::CacheSource;
  use crate::error::ApiError;
  use crate::tracker::cache::Mutation;
  use crate::tracker::types::{IssueId, ProjectId};
  use std::sync::atomic::{AtomicU32, Ordering};

  fn counting_loader(
    calls: &Arc<AtomicU32>,
    value: u32,
  ) -> impl FnOnce() -> std::future::Ready<ApiResult<u32>> {
    let calls = Arc::clone(calls);
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      std::future::ready(Ok(value))
    }
  }

  #[tokio::test]
  async fn test_second_fetch_served_from_cache() {
    let cache = QueryCache::new(MemoryStorage::new());
    let key = QueryKey::project(ProjectId(1));
    let calls = Arc::new(AtomicU32::new(0));

    let first = cache.fetch_or_serve(&key, counting_loader(&calls, 7)).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = cache.fetch_or_serve(&key, counting_loader(&calls, 8)).await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_independently_built_keys_hit_same_entry() {
    let cache = QueryCache::new(MemoryStorage::new());
    let calls = Arc::new(AtomicU32::new(0));

    cache
      .fetch_or_serve(&QueryKey::issue(ProjectId(1), IssueId(2)), counting_loader(&calls, 1))
      .await
      .unwrap();
    cache
      .fetch_or_serve(&QueryKey::issue(ProjectId(1), IssueId(2)), counting_loader(&calls, 2))
      .await
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidated_entry_is_refetched() {
    let cache = QueryCache::new(MemoryStorage::new());
    let key = QueryKey::project(ProjectId(1));
    let calls = Arc::new(AtomicU32::new(0));

    cache.fetch_or_serve(&key, counting_loader(&calls, 1)).await.unwrap();
    let touched = cache.invalidate(&[Invalidation::Key(key.clone())]);
    assert_eq!(touched, vec![key.clone()]);

    let result = cache.fetch_or_serve(&key, counting_loader(&calls, 2)).await.unwrap();
    assert_eq!(result.data, 2);
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_zero_stale_time_always_refetches() {
    let cache = QueryCache::new(MemoryStorage::new()).with_stale_time(Duration::zero());
    let key = QueryKey::all_projects();
    let calls = Arc::new(AtomicU32::new(0));

    cache.fetch_or_serve(&key, counting_loader(&calls, 1)).await.unwrap();
    cache.fetch_or_serve(&key, counting_loader(&calls, 1)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_loader_error_propagates_on_miss() {
    let cache = QueryCache::new(MemoryStorage::new());
    let key = QueryKey::project(ProjectId(3));

    let result = cache
      .fetch_or_serve::<u32, _, _>(&key, || async {
        Err(ApiError::Status {
          method: "GET".into(),
          path: "/projects/3".into(),
          status: 404,
          body: None,
        })
      })
      .await;
    assert!(matches!(result, Err(ApiError::Status { status: 404, .. })));
    assert!(cache.keys().is_empty());
  }

  #[tokio::test]
  async fn test_offline_serves_aged_entry_but_not_invalidated_one() {
    let cache = QueryCache::new(MemoryStorage::new()).with_stale_time(Duration::zero());
    let key = QueryKey::all_projects();
    cache
      .fetch_or_serve(&key, || async { Ok::<_, ApiError>(vec![1u32, 2]) })
      .await
      .unwrap();

    // Nothing listens on port 1, so the request fails to connect.
    let unreachable = || async {
      let err = reqwest::get("http://127.0.0.1:1/").await.unwrap_err();
      Err::<Vec<u32>, _>(ApiError::Transport(err))
    };

    let result = cache.fetch_or_serve(&key, unreachable).await.unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, vec![1, 2]);

    cache.invalidate_all();
    let result = cache.fetch_or_serve(&key, unreachable).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_subscribers_see_invalidate_but_not_store() {
    let cache = QueryCache::new(MemoryStorage::new());
    let key = QueryKey::project(ProjectId(1));
    let rx = cache.subscribe(&key);
    assert!(!rx.has_changed().unwrap());

    cache
      .fetch_or_serve(&key, || async { Ok::<_, ApiError>(1u32) })
      .await
      .unwrap();
    assert!(!rx.has_changed().unwrap());

    cache.invalidate(&[Invalidation::Key(QueryKey::project(ProjectId(2)))]);
    assert!(!rx.has_changed().unwrap());

    cache.invalidate(&[Invalidation::Key(key.clone())]);
    assert!(rx.has_changed().unwrap());
  }

  #[tokio::test]
  async fn test_load_overlapping_invalidation_is_kept_stale() {
    let cache = QueryCache::new(MemoryStorage::new());
    let key = QueryKey::issue(ProjectId(1), IssueId(5));
    let (started_tx, started) = tokio::sync::oneshot::channel::<()>();
    let (release, released) = tokio::sync::oneshot::channel::<()>();

    let pending = tokio::spawn({
      let cache = cache.clone();
      let key = key.clone();
      async move {
        cache
          .fetch_or_serve(&key, || async move {
            let _ = started_tx.send(());
            let _ = released.await;
            Ok::<_, ApiError>("before-write".to_string())
          })
          .await
      }
    });
    started.await.unwrap();

    cache.invalidate(
      &Mutation::UpdateIssue {
        project_id: ProjectId(1),
        issue_id: IssueId(5),
      }
      .invalidations(),
    );
    release.send(()).unwrap();
    let first = pending.await.unwrap().unwrap();
    assert_eq!(first.data, "before-write");

    let after = cache
      .fetch_or_serve(&key, || async { Ok::<_, ApiError>("after-write".to_string()) })
      .await
      .unwrap();
    assert_eq!(after.data, "after-write");
    assert_eq!(after.source, CacheSource::Network);

    let again = cache
      .fetch_or_serve(&key, || async { Ok::<_, ApiError>("unused".to_string()) })
      .await
      .unwrap();
    assert_eq!(again.data, "after-write");
    assert_eq!(again.source, CacheSource::CacheFresh);
  }

  #[tokio::test]
  async fn test_subscriber_notified_without_stored_entry() {
    let cache = QueryCache::new(NoopStorage);
    let key = QueryKey::project(ProjectId(9));
    let rx = cache.subscribe(&key);

    let touched = cache.invalidate_all();
    assert_eq!(touched, vec![key]);
    assert!(rx.has_changed().unwrap());
  }
}
