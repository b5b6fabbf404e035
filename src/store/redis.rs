//! Redis store backend
//!
//! A single RESP2 connection. Requests are strictly request/response; the
//! writer actor is the only caller so the connection lock is uncontended.

use super::{KvStore, StoreFuture};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::resp::{RespCodec, RespValue};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info};

pub struct RedisStore {
    conn: Mutex<Framed<TcpStream, RespCodec>>,
    addr: String,
}

impl RedisStore {
    /// Connect, then `AUTH` and `SELECT` as the store options require
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let addr = config.addr();
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;

        let store = RedisStore {
            conn: Mutex::new(Framed::new(stream, RespCodec)),
            addr,
        };

        if let Some(password) = config.password() {
            match config.username() {
                Some(user) => store.request(RespValue::command(["AUTH", user, password])).await?,
                None => store.request(RespValue::command(["AUTH", password])).await?,
            };
        }
        let db = config
            .db()
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        if let Some(db) = db {
            store
                .request(RespValue::command(["SELECT", db.to_string().as_str()]))
                .await?;
        }

        info!("Connected to Redis at {}", store.addr);
        Ok(store)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        match self.request(RespValue::command(["PING"])).await? {
            RespValue::SimpleString(s) if &s[..] == b"PONG" => Ok(()),
            other => Err(StoreError::Protocol(format!("unexpected PING reply: {:?}", other))),
        }
    }

    /// Send one command and wait for its reply. Error replies become
    /// `StoreError::Server`.
    pub async fn request(&self, command: RespValue) -> Result<RespValue, StoreError> {
        let mut conn = self.conn.lock().await;
        conn.send(command).await?;
        match conn.next().await {
            Some(Ok(RespValue::Error(msg))) => {
                let msg = String::from_utf8_lossy(&msg).into_owned();
                debug!("Redis error reply from {}: {}", self.addr, msg);
                Err(StoreError::Server(msg))
            }
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(StoreError::Protocol(e.to_string())),
            None => Err(StoreError::ConnectionClosed),
        }
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("addr", &self.addr).finish()
    }
}

impl KvStore for RedisStore {
    fn set_string<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a> {
        Box::pin(async move {
            self.request(RespValue::command(["SET", key, value])).await?;
            Ok(())
        })
    }

    fn set_fields<'a>(&'a self, key: &'a str, fields: &'a [(String, String)]) -> StoreFuture<'a> {
        Box::pin(async move {
            // HSET with no field/value pairs is an arity error on the server
            if fields.is_empty() {
                return Ok(());
            }
            let mut parts: Vec<&str> = Vec::with_capacity(2 + fields.len() * 2);
            parts.push("HSET");
            parts.push(key);
            for (field, value) in fields {
                parts.push(field);
                parts.push(value);
            }
            self.request(RespValue::command(parts)).await?;
            Ok(())
        })
    }

    fn add_to_sorted_set<'a>(
        &'a self,
        key: &'a str,
        score: f64,
        member: &'a str,
    ) -> StoreFuture<'a> {
        Box::pin(async move {
            let score = score.to_string();
            self.request(RespValue::command(["ZINCRBY", key, score.as_str(), member]))
                .await?;
            Ok(())
        })
    }
}
