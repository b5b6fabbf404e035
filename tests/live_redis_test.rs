//! Live Redis tests
//!
//! Need a Redis server on localhost:6379 (or ROW_STREAM_REDIS_HOST/PORT).
//! Run with: cargo test --test live_redis_test -- --ignored
//!
//! Records are written through `RedisStore` and read back with the `redis`
//! client crate.

use redis_row_stream::config::{PersisterConfig, StoreConfig, Structure};
use redis_row_stream::persister::{Closeable, Writable};
use redis_row_stream::{Record, RedisStore, RowPersister};
use std::collections::HashMap;
use std::sync::Arc;

fn store_config() -> StoreConfig {
    PersisterConfig::from_env()
        .expect("ROW_STREAM_* variables should be valid")
        .store
}

async fn client_connection() -> redis::aio::MultiplexedConnection {
    let config = store_config();
    let client = redis::Client::open(format!("redis://{}/", config.addr())).unwrap();
    client.get_multiplexed_async_connection().await.unwrap()
}

async fn delete_prefix(con: &mut redis::aio::MultiplexedConnection, pattern: &str) {
    let keys: Vec<String> = redis::cmd("KEYS").arg(pattern).query_async(con).await.unwrap();
    if !keys.is_empty() {
        let _: i64 = redis::cmd("DEL").arg(&keys).query_async(con).await.unwrap();
    }
}

fn rows() -> Vec<Record> {
    [("56", "78", "90"), ("1", "2", "3"), ("x", "y", "z")]
        .iter()
        .map(|(a, b, c)| Record::from_pairs(&[("A", *a), ("B", *b), ("C", *c)]))
        .collect()
}

async fn persist(config: PersisterConfig) {
    let store = Arc::new(RedisStore::connect(&config.store).await.unwrap());
    let (mut persister, task) = RowPersister::spawn(config, store);
    for record in rows() {
        assert_eq!(persister.accept(&record), Ok(true));
    }
    persister.close(None).unwrap();
    persister.shutdown().await;
    task.await.unwrap();
    assert_eq!(persister.stats().failed, 0);
}

#[tokio::test]
#[ignore]
async fn test_live_string_structure() {
    let mut con = client_connection().await;
    delete_prefix(&mut con, "live_string:*").await;

    let mut config = PersisterConfig::new("live_string");
    config.store = store_config();
    persist(config).await;

    let value: String = redis::cmd("GET")
        .arg("live_string:2")
        .query_async(&mut con)
        .await
        .unwrap();
    assert_eq!(value, r#"{"A":"x","B":"y","C":"z"}"#);

    let keys: Vec<String> = redis::cmd("KEYS")
        .arg("live_string:*")
        .query_async(&mut con)
        .await
        .unwrap();
    assert_eq!(keys.len(), 3);
}

#[tokio::test]
#[ignore]
async fn test_live_hash_structure() {
    let mut con = client_connection().await;
    delete_prefix(&mut con, "live_hash:*").await;

    let mut config = PersisterConfig::new("live_hash").with_structure(Structure::Hash);
    config.store = store_config();
    persist(config).await;

    for (i, record) in rows().iter().enumerate() {
        let stored: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(format!("live_hash:{}", i))
            .query_async(&mut con)
            .await
            .unwrap();
        let expected: HashMap<String, String> = record.to_fields().into_iter().collect();
        assert_eq!(stored, expected);
    }
}

#[tokio::test]
#[ignore]
async fn test_live_index() {
    let mut con = client_connection().await;
    delete_prefix(&mut con, "live_index:*").await;
    delete_prefix(&mut con, "live_search:*").await;

    let mut config = PersisterConfig::new("live_index").with_index(["A"]);
    config.index_namespace = "live_search".to_string();
    config.store = store_config();
    persist(config).await;

    let members: Vec<String> = redis::cmd("ZRANGE")
        .arg("live_search:word:x")
        .arg(0)
        .arg(-1)
        .query_async(&mut con)
        .await
        .unwrap();
    assert_eq!(members, vec!["live_index:2"]);
}

#[tokio::test]
#[ignore]
async fn test_live_ping() {
    let store = RedisStore::connect(&store_config()).await.unwrap();
    store.ping().await.unwrap();
}
