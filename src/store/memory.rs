//! In-memory store for unit tests and deterministic simulation.
//!
//! Follows Redis typing rules for the three commands the persister issues:
//! `SET` overwrites any value, `HSET` and `ZINCRBY` fail with WRONGTYPE on a
//! key holding another type.

use super::{KvStore, StoreFuture};
use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    String(String),
    Hash(BTreeMap<String, String>),
    SortedSet(BTreeMap<String, f64>),
}

impl StoredValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            StoredValue::String(_) => "string",
            StoredValue::Hash(_) => "hash",
            StoredValue::SortedSet(_) => "zset",
        }
    }
}

/// Shared in-memory keyspace. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<StoredValue> {
        self.data.read().get(key).cloned()
    }

    /// Value of a string key (Redis `GET`)
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.data.read().get(key) {
            Some(StoredValue::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Fields of a hash key (Redis `HGETALL`)
    pub fn get_fields(&self, key: &str) -> Option<HashMap<String, String>> {
        match self.data.read().get(key) {
            Some(StoredValue::Hash(h)) => {
                Some(h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            }
            _ => None,
        }
    }

    /// Members and scores of a sorted-set key
    pub fn get_sorted_set(&self, key: &str) -> Option<BTreeMap<String, f64>> {
        match self.data.read().get(key) {
            Some(StoredValue::SortedSet(z)) => Some(z.clone()),
            _ => None,
        }
    }

    /// Keys starting with `prefix`, sorted (Redis `KEYS prefix*`)
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn clear(&self) {
        self.data.write().clear();
    }

    fn set_string_sync(&self, key: &str, value: &str) {
        self.data
            .write()
            .insert(key.to_string(), StoredValue::String(value.to_string()));
    }

    fn set_fields_sync(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        // HSET with nothing to set is skipped, as `RedisStore` does
        if fields.is_empty() {
            return Ok(());
        }
        let mut data = self.data.write();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::Hash(BTreeMap::new()));
        match entry {
            StoredValue::Hash(h) => {
                for (field, value) in fields {
                    h.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn add_to_sorted_set_sync(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        let mut data = self.data.write();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::SortedSet(BTreeMap::new()));
        match entry {
            StoredValue::SortedSet(z) => {
                *z.entry(member.to_string()).or_insert(0.0) += score;
                Ok(())
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }
}

impl KvStore for InMemoryStore {
    fn set_string<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a> {
        Box::pin(async move {
            self.set_string_sync(key, value);
            Ok(())
        })
    }

    fn set_fields<'a>(&'a self, key: &'a str, fields: &'a [(String, String)]) -> StoreFuture<'a> {
        Box::pin(async move { self.set_fields_sync(key, fields) })
    }

    fn add_to_sorted_set<'a>(
        &'a self,
        key: &'a str,
        score: f64,
        member: &'a str,
    ) -> StoreFuture<'a> {
        Box::pin(async move { self.add_to_sorted_set_sync(key, score, member) })
    }
}
