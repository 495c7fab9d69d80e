//! Typed state stores over the KV service.
//!
//! Six stores, one key family each. The orchestrator loads copies at turn
//! start, mutates them locally (see [`changes::TurnWrites`]) and flushes at
//! commit; nothing in this module writes mid-turn.

pub mod changes;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use keeper_domain::{CharacterSheet, ConversationEntry, EventId, MapId, MapState, SessionState};
use keeper_domain::CharacterId;

use crate::infrastructure::ports::{KvError, KvPort};

pub use changes::TurnWrites;

/// Per-character keys expire after a day of inactivity; world state never
/// expires.
pub const CHARACTER_KEY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const WORLD_STATE_KEY: &str = "world_state";
const MAP_STATE_KEY_PREFIX: &str = "map_state:";
const SHEET_KEY_PREFIX: &str = "character_sheet:";
const SESSION_KEY_PREFIX: &str = "session_state:";
const CONVERSATION_KEY_PREFIX: &str = "conversation_history:";
const COMPLETED_EVENTS_KEY_PREFIX: &str = "completed_events:";

/// Errors from the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A read the turn cannot proceed without came back empty.
    #[error("{entity_type} not found: {id}")]
    EntityMissing {
        entity_type: &'static str,
        id: String,
    },

    /// KV backend down or command failed.
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("State blob malformed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn missing(entity_type: &'static str, id: impl ToString) -> Self {
        Self::EntityMissing {
            entity_type,
            id: id.to_string(),
        }
    }
}

impl From<KvError> for StoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Unavailable(message) => Self::Unavailable(message),
        }
    }
}

/// The six typed stores, sharing one KV backend.
#[derive(Clone)]
pub struct Stores {
    kv: Arc<dyn KvPort>,
}

impl Stores {
    pub fn new(kv: Arc<dyn KvPort>) -> Self {
        Self { kv }
    }

    pub async fn ping(&self) -> bool {
        self.kv.ping().await
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.kv.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialization(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StoreError::Serialization(format!("{key}: {e}")))?;
        match ttl {
            Some(ttl) => self.kv.put_ex(key, raw, ttl).await?,
            None => self.kv.put(key, raw).await?,
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // World state
    // -------------------------------------------------------------------------

    /// The global world KV; an unseeded store reads as empty.
    pub async fn world_state(&self) -> Result<HashMap<String, serde_json::Value>, StoreError> {
        Ok(self.read(WORLD_STATE_KEY).await?.unwrap_or_default())
    }

    pub async fn put_world_state(
        &self,
        state: &HashMap<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.write(WORLD_STATE_KEY, state, None).await
    }

    // -------------------------------------------------------------------------
    // Map state
    // -------------------------------------------------------------------------

    pub async fn map_state(&self, map_id: MapId) -> Result<Option<MapState>, StoreError> {
        self.read(&format!("{MAP_STATE_KEY_PREFIX}{map_id}")).await
    }

    pub async fn require_map_state(&self, map_id: MapId) -> Result<MapState, StoreError> {
        self.map_state(map_id)
            .await?
            .ok_or_else(|| StoreError::missing("MapState", map_id))
    }

    pub async fn put_map_state(&self, map_id: MapId, state: &MapState) -> Result<(), StoreError> {
        self.write(
            &format!("{MAP_STATE_KEY_PREFIX}{map_id}"),
            state,
            Some(CHARACTER_KEY_TTL),
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Character sheets
    // -------------------------------------------------------------------------

    pub async fn character_sheet(
        &self,
        id: &CharacterId,
    ) -> Result<Option<CharacterSheet>, StoreError> {
        self.read(&format!("{SHEET_KEY_PREFIX}{id}")).await
    }

    pub async fn require_character_sheet(
        &self,
        id: &CharacterId,
    ) -> Result<CharacterSheet, StoreError> {
        self.character_sheet(id)
            .await?
            .ok_or_else(|| StoreError::missing("CharacterSheet", id))
    }

    pub async fn put_character_sheet(
        &self,
        id: &CharacterId,
        sheet: &CharacterSheet,
    ) -> Result<(), StoreError> {
        self.write(
            &format!("{SHEET_KEY_PREFIX}{id}"),
            sheet,
            Some(CHARACTER_KEY_TTL),
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Session state
    // -------------------------------------------------------------------------

    pub async fn session_state(
        &self,
        id: &CharacterId,
    ) -> Result<Option<SessionState>, StoreError> {
        self.read(&format!("{SESSION_KEY_PREFIX}{id}")).await
    }

    pub async fn require_session_state(
        &self,
        id: &CharacterId,
    ) -> Result<SessionState, StoreError> {
        self.session_state(id)
            .await?
            .ok_or_else(|| StoreError::missing("SessionState", id))
    }

    pub async fn put_session_state(
        &self,
        id: &CharacterId,
        session: &SessionState,
    ) -> Result<(), StoreError> {
        self.write(
            &format!("{SESSION_KEY_PREFIX}{id}"),
            session,
            Some(CHARACTER_KEY_TTL),
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Conversation history
    // -------------------------------------------------------------------------

    pub async fn conversation_history(
        &self,
        id: &CharacterId,
    ) -> Result<Vec<ConversationEntry>, StoreError> {
        Ok(self
            .read(&format!("{CONVERSATION_KEY_PREFIX}{id}"))
            .await?
            .unwrap_or_default())
    }

    pub async fn put_conversation_history(
        &self,
        id: &CharacterId,
        history: &[ConversationEntry],
    ) -> Result<(), StoreError> {
        self.write(
            &format!("{CONVERSATION_KEY_PREFIX}{id}"),
            &history,
            Some(CHARACTER_KEY_TTL),
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Completed events
    // -------------------------------------------------------------------------

    pub async fn completed_events(&self, id: &CharacterId) -> Result<Vec<EventId>, StoreError> {
        Ok(self
            .read(&format!("{COMPLETED_EVENTS_KEY_PREFIX}{id}"))
            .await?
            .unwrap_or_default())
    }

    pub async fn put_completed_events(
        &self,
        id: &CharacterId,
        events: &[EventId],
    ) -> Result<(), StoreError> {
        self.write(
            &format!("{COMPLETED_EVENTS_KEY_PREFIX}{id}"),
            &events,
            Some(CHARACTER_KEY_TTL),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_kv::MemoryKv;
    use keeper_domain::ObjectId;

    fn stores() -> Stores {
        Stores::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn save_then_load_is_identity_for_each_store() {
        let stores = stores();
        let id = CharacterId::new("investigator");

        let mut world = HashMap::new();
        world.insert("road_blocked".to_string(), serde_json::json!(true));
        stores.put_world_state(&world).await.expect("put world");
        assert_eq!(stores.world_state().await.expect("get world"), world);

        let mut map = MapState::default();
        map.npcs.push(CharacterId::new("old_joe"));
        map.objects
            .insert(ObjectId::new(301), serde_json::json!({"fuel": 3}));
        map.add_edge(MapId::new(2));
        stores
            .put_map_state(MapId::new(1), &map)
            .await
            .expect("put map");
        assert_eq!(
            stores.map_state(MapId::new(1)).await.expect("get map"),
            Some(map)
        );

        let history = vec![
            ConversationEntry::player("我四处看看"),
            ConversationEntry::keeper("雨幕沉沉。"),
        ];
        stores
            .put_conversation_history(&id, &history)
            .await
            .expect("put history");
        assert_eq!(
            stores.conversation_history(&id).await.expect("get history"),
            history
        );

        let completed = vec![EventId::new(5), EventId::new(7)];
        stores
            .put_completed_events(&id, &completed)
            .await
            .expect("put completed");
        assert_eq!(
            stores.completed_events(&id).await.expect("get completed"),
            completed
        );
    }

    #[tokio::test]
    async fn required_reads_surface_entity_missing() {
        let stores = stores();
        let err = stores
            .require_session_state(&CharacterId::new("ghost"))
            .await
            .expect_err("missing session");
        assert!(matches!(err, StoreError::EntityMissing { .. }));
        assert_eq!(err.to_string(), "SessionState not found: ghost");
    }

    #[tokio::test]
    async fn absent_lists_read_as_empty() {
        let stores = stores();
        let id = CharacterId::new("fresh");
        assert!(stores
            .conversation_history(&id)
            .await
            .expect("history")
            .is_empty());
        assert!(stores
            .completed_events(&id)
            .await
            .expect("completed")
            .is_empty());
    }
}
