//! Application state and composition.

use std::sync::Arc;

use tokio::sync::RwLock;

use keeper_domain::{CharacterId, CharacterSheet, MapId, SessionState};

use crate::api::dice_ws::DiceHub;
use crate::infrastructure::ports::{
    CatalogPort, DiceSinkPort, MemoryPort, OraclePort, RandomPort,
};
use crate::stores::{changes, Stores};
use crate::turn::{TurnError, TurnService};

/// Where the scenario starts: every entering character is placed on the
/// opening road, in the car.
const ENTRY_MAP_ID: MapId = MapId::new(1);
const ENTRY_VEHICLE_ID: i64 = 101;

/// What `/api/character_entered` bootstrapped.
pub struct EnteredCounts {
    pub npcs: usize,
    pub objects: usize,
}

/// Main application state, shared across HTTP and WebSocket handlers.
pub struct App {
    pub stores: Stores,
    pub catalog: Arc<dyn CatalogPort>,
    pub turns: TurnService,
    pub dice_hub: Arc<DiceHub>,
    /// Ambient session context: the character that most recently entered.
    current_character: RwLock<Option<CharacterId>>,
}

impl App {
    pub fn new(
        stores: Stores,
        catalog: Arc<dyn CatalogPort>,
        oracle: Arc<dyn OraclePort>,
        memory: Arc<dyn MemoryPort>,
        dice_hub: Arc<DiceHub>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        let dice: Arc<dyn DiceSinkPort> = dice_hub.clone();
        let turns = TurnService::new(
            stores.clone(),
            catalog.clone(),
            oracle,
            memory,
            dice,
            random,
        );
        Self {
            stores,
            catalog,
            turns,
            dice_hub,
            current_character: RwLock::new(None),
        }
    }

    pub async fn current_character(&self) -> Option<CharacterId> {
        self.current_character.read().await.clone()
    }

    /// Seed the world KV from the catalog once at startup. An already
    /// seeded store is left alone.
    pub async fn seed_world_state(&self) -> Result<(), TurnError> {
        if !self.stores.world_state().await?.is_empty() {
            tracing::debug!("World state already seeded");
            return Ok(());
        }
        let seed = self.catalog.world_seed().await?;
        tracing::info!(keys = seed.len(), "Seeding world state from catalog");
        self.stores.put_world_state(&seed).await?;
        Ok(())
    }

    /// Bootstrap everything a character needs to start playing: the sheet,
    /// a fresh session at the scenario entry point, the entry map's state
    /// and sessions for every NPC on it.
    pub async fn enter_character(&self, id: &CharacterId) -> Result<EnteredCounts, TurnError> {
        let catalog = self.catalog.as_ref();
        let Some(mut sheet) = catalog.character_sheet(id).await? else {
            return Err(TurnError::entity_missing("CharacterSheet", id));
        };

        // Reset the catalog row to the scenario opening.
        catalog
            .update_character_location(id, ENTRY_MAP_ID, Some(ENTRY_VEHICLE_ID))
            .await?;
        sheet.info.current_location_id = Some(ENTRY_MAP_ID);
        sheet.info.current_vehicle_id = Some(ENTRY_VEHICLE_ID);

        let session = SessionState::materialize(&sheet, ENTRY_MAP_ID);
        let map_state = changes::build_map_state(catalog, ENTRY_MAP_ID).await?;

        self.stores.put_character_sheet(id, &sheet).await?;
        self.stores.put_session_state(id, &session).await?;
        self.stores.put_map_state(ENTRY_MAP_ID, &map_state).await?;

        for npc_id in &map_state.npcs {
            let Some(npc_sheet) = catalog.character_sheet(npc_id).await? else {
                tracing::warn!(npc = %npc_id, "Map NPC has no character sheet");
                continue;
            };
            self.stores.put_character_sheet(npc_id, &npc_sheet).await?;
            if self.stores.session_state(npc_id).await?.is_none() {
                let npc_session = SessionState::materialize(&npc_sheet, ENTRY_MAP_ID);
                self.stores.put_session_state(npc_id, &npc_session).await?;
            }
        }

        *self.current_character.write().await = Some(id.clone());
        tracing::info!(
            character = %id,
            npcs = map_state.npcs.len(),
            objects = map_state.objects.len(),
            "Character entered"
        );
        Ok(EnteredCounts {
            npcs: map_state.npcs.len(),
            objects: map_state.objects.len(),
        })
    }

    /// Sheet + live session view for the read endpoints. The session is
    /// materialized (and persisted) when absent so the client always sees
    /// a status block.
    pub async fn character_view(
        &self,
        id: &CharacterId,
    ) -> Result<(CharacterSheet, SessionState), TurnError> {
        let sheet = match self.stores.character_sheet(id).await? {
            Some(sheet) => sheet,
            None => self
                .catalog
                .character_sheet(id)
                .await?
                .ok_or_else(|| TurnError::entity_missing("CharacterSheet", id))?,
        };
        let session = match self.stores.session_state(id).await? {
            Some(session) => session,
            None => {
                let session = SessionState::materialize(&sheet, ENTRY_MAP_ID);
                self.stores.put_session_state(id, &session).await?;
                session
            }
        };
        Ok((sheet, session))
    }
}
