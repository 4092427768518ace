//! Tracker backend: wire types, query keys, HTTP plumbing and clients.

pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod http;
#[cfg(test)]
mod test_support;
pub mod types;

pub use cached_client::CachedTrackerClient;
