//! Memory shelf adapters.
//!
//! The long-term NPC memory lives in an external service; the reactor loop
//! only asks for short recall snippets and emits write events. A missing
//! shelf degrades to empty snippets, never to a failed turn.

use async_trait::async_trait;
use serde::Deserialize;

use keeper_domain::CharacterId;

use crate::infrastructure::ports::{MemoryError, MemoryPort, MemorySnippets};

/// HTTP adapter for the external memory shelf.
#[derive(Clone)]
pub struct HttpMemoryShelf {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMemoryShelf {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecallResponse {
    #[serde(default)]
    short_term: String,
    #[serde(default)]
    long_term: String,
}

#[async_trait]
impl MemoryPort for HttpMemoryShelf {
    async fn recall(&self, npc_id: &CharacterId) -> Result<MemorySnippets, MemoryError> {
        let response = self
            .client
            .get(format!("{}/recall/{}", self.base_url, npc_id))
            .send()
            .await
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;
        let body: RecallResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;
        Ok(MemorySnippets {
            short_term: body.short_term,
            long_term: body.long_term,
        })
    }

    async fn record(&self, npc_id: &CharacterId, observation: &str) -> Result<(), MemoryError> {
        self.client
            .post(format!("{}/record/{}", self.base_url, npc_id))
            .json(&serde_json::json!({ "observation": observation }))
            .send()
            .await
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// No-op shelf for runs without a memory service.
pub struct NullMemoryShelf;

#[async_trait]
impl MemoryPort for NullMemoryShelf {
    async fn recall(&self, _npc_id: &CharacterId) -> Result<MemorySnippets, MemoryError> {
        Ok(MemorySnippets::default())
    }

    async fn record(&self, _npc_id: &CharacterId, _observation: &str) -> Result<(), MemoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_shelf_recalls_nothing() {
        let shelf = NullMemoryShelf;
        let snippets = shelf
            .recall(&CharacterId::new("old_joe"))
            .await
            .expect("recall");
        assert_eq!(snippets, MemorySnippets::default());
    }
}
