//! Query cache for tracker data.
//!
//! This module provides an in-process read-through cache that:
//! - Stores query results under structured [`QueryKey`](crate::tracker::cache::QueryKey)s
//! - Serves fresh entries without touching the network
//! - Marks entries stale on explicit invalidation and refetches on next access
//! - Notifies subscribers whenever a key is invalidated
//! - Provides basic offline mode (serve aged entries when the backend is unreachable)

mod layer;
mod result;
mod storage;

pub use layer::QueryCache;
pub use result::{CacheResult, CacheSource};
pub use storage::{MemoryStorage, NoopStorage};
