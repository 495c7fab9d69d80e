//! Redis adapter for the dynamic state stores.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::infrastructure::ports::{KvError, KvPort};

/// KV adapter over a Redis connection manager.
///
/// The manager reconnects on its own; individual command failures surface
/// as `KvError::Unavailable` and abort the turn before any commit.
#[derive(Clone)]
pub struct RedisKv {
    connection: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client =
            redis::Client::open(url).map_err(|e| KvError::Unavailable(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))?;
        tracing::info!(url, "Connected to Redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl KvPort for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut connection = self.connection.clone();
        connection
            .get(key)
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), KvError> {
        let mut connection = self.connection.clone();
        connection
            .set::<_, _, ()>(key, value)
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))
    }

    async fn put_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))
    }

    async fn ping(&self) -> bool {
        let mut connection = self.connection.clone();
        let pong: Result<String, redis::RedisError> =
            redis::cmd("PING").query_async(&mut connection).await;
        pong.is_ok()
    }
}
