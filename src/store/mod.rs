//! Key-Value Store Abstraction
//!
//! The persister writes through this trait and never reads back.
//!
//! Implementations:
//! - `InMemoryStore`: For unit tests and DST
//! - `RedisStore`: RESP2 over TCP, for production
//! - `SimulatedStore`: Wraps another store and injects write failures

pub mod memory;
pub mod redis;
pub mod simulated;

pub use memory::{InMemoryStore, StoredValue};
pub use redis::RedisStore;
pub use simulated::{SimulatedStore, SimulatedStoreConfig, SimulatedStoreStats};

use crate::error::StoreError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type StoreFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

/// Write side of a key-value store
pub trait KvStore: Send + Sync + 'static {
    /// Store a single string value under `key` (Redis `SET`)
    fn set_string<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a>;

    /// Store a field map under `key` (Redis `HSET`)
    fn set_fields<'a>(&'a self, key: &'a str, fields: &'a [(String, String)]) -> StoreFuture<'a>;

    /// Increment the score of `member` in the sorted set at `key`
    /// (Redis `ZINCRBY`). Used by the search index.
    fn add_to_sorted_set<'a>(&'a self, key: &'a str, score: f64, member: &'a str)
        -> StoreFuture<'a>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn set_string<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a> {
        (**self).set_string(key, value)
    }

    fn set_fields<'a>(&'a self, key: &'a str, fields: &'a [(String, String)]) -> StoreFuture<'a> {
        (**self).set_fields(key, fields)
    }

    fn add_to_sorted_set<'a>(
        &'a self,
        key: &'a str,
        score: f64,
        member: &'a str,
    ) -> StoreFuture<'a> {
        (**self).add_to_sorted_set(key, score, member)
    }
}
