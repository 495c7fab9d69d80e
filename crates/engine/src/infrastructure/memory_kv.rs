//! In-memory KV adapter.
//!
//! Used by tests and by local runs without a Redis server. TTLs are honored
//! lazily: an expired entry is dropped on the next read.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::infrastructure::ports::{KvError, KvPort};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct MemoryKv {
    entries: DashMap<String, Entry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvPort for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        if let Some(entry) = self.entries.get(key) {
            if let Some(expires_at) = entry.expires_at {
                if Instant::now() >= expires_at {
                    drop(entry);
                    self.entries.remove(key);
                    return Ok(None);
                }
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: String) -> Result<(), KvError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn put_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_round_trip() {
        let kv = MemoryKv::new();
        kv.put("world_state", "{}".to_string()).await.expect("put");
        assert_eq!(kv.get("world_state").await.expect("get").as_deref(), Some("{}"));
        assert_eq!(kv.get("missing").await.expect("get"), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let kv = MemoryKv::new();
        kv.put_ex("session_state:x", "{}".to_string(), Duration::from_secs(0))
            .await
            .expect("put_ex");
        assert_eq!(kv.get("session_state:x").await.expect("get"), None);
    }
}
