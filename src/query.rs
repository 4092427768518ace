//! Async query abstraction for data fetching on top of the query cache.
//!
//! A `Query<T>` runs its fetcher on a background task and exposes the
//! loading, success and error states. When bound to a [`QueryKey`] it also
//! watches the [`QueryCache`] and refetches by itself once a mutation
//! invalidates that key.
//!
//! # Example
//!
//! ```ignore
//! let client = tracker.clone();
//! let mut query = Query::new(move || {
//!     let client = client.clone();
//!     async move { client.project_issues(project_id).await.map_err(|e| e.to_string()) }
//! })
//! .watching(tracker.cache(), &QueryKey::project_issues(project_id));
//!
//! query.fetch();
//!
//! // In the event loop tick
//! if query.poll() {
//!     // State changed, redraw
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::cache::QueryCache;
use crate::tracker::cache::QueryKey;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Async query with state management.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, String>>>,
  /// Change feed of the cached key this query reads, if bound
  changes: Option<watch::Receiver<u64>>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is called on `fetch()` and on every watched invalidation.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      receiver: None,
      changes: None,
      fetched_at: None,
      stale_time: Duration::from_secs(300),
    }
  }

  /// Refetch whenever `key` is invalidated in `cache`.
  pub fn watching(mut self, cache: &QueryCache, key: &QueryKey) -> Self {
    self.changes = Some(cache.subscribe(key));
    self
  }

  /// Set the stale time for this query.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// Check if the data is older than the stale time.
  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| t.elapsed() >= self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Start fetching data. No-op while already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Poll for results from a pending fetch, and refetch if the watched
  /// key changed since the last result.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    if let Some(receiver) = &mut self.receiver {
      return match receiver.try_recv() {
        Ok(result) => {
          self.finish(result);
          true
        }
        Err(mpsc::error::TryRecvError::Empty) => false,
        Err(mpsc::error::TryRecvError::Disconnected) => {
          self.finish(Err("Query was cancelled".to_string()));
          true
        }
      };
    }

    let changed = self
      .changes
      .as_ref()
      .is_some_and(|rx| rx.has_changed().unwrap_or(false));
    if changed && !matches!(self.state, QueryState::Idle) {
      self.start_fetch();
      return true;
    }
    false
  }

  fn finish(&mut self, result: Result<T, String>) {
    match result {
      Ok(data) => {
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
      }
      Err(error) => self.state = QueryState::Error(error),
    }
    self.receiver = None;
  }

  fn start_fetch(&mut self) {
    // Changes up to now are covered by this fetch.
    if let Some(changes) = &mut self.changes {
      changes.borrow_and_update();
    }

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.fetcher)();
    tokio::spawn(async move {
      let result = future.await;
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}
