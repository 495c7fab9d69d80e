//! Turn-local state mutation.
//!
//! A turn never writes a store mid-flight. [`TurnWrites`] holds read-through
//! copies of everything the turn touches; the synthesizer applies effect
//! directives against it and the driver flushes it once at commit. If any
//! stage fails first, the buffer is dropped and no store changes.

use std::collections::HashMap;

use keeper_domain::{
    CharacterId, CharacterSheet, ConversationEntry, EdgeAction, EventId, MapId, MapState,
    MapStateChange, ObjectStateChange, SessionState, StateChange,
};

use crate::infrastructure::ports::{CatalogError, CatalogPort};
use crate::stores::{StoreError, Stores};

fn catalog_unavailable(err: CatalogError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Build a fresh map state from the catalog (NPC roster, object blobs,
/// accessibility edges). Pure read; callers persist it.
pub async fn build_map_state(
    catalog: &dyn CatalogPort,
    map_id: MapId,
) -> Result<MapState, StoreError> {
    let npcs = catalog
        .npcs_on_map(map_id)
        .await
        .map_err(catalog_unavailable)?;
    let objects = catalog
        .objects_on_map(map_id)
        .await
        .map_err(catalog_unavailable)?
        .into_iter()
        .map(|object| (object.object_id, object.current_state))
        .collect();
    let accessible_maps = catalog
        .accessible_maps(map_id)
        .await
        .map_err(catalog_unavailable)?;
    Ok(MapState {
        npcs,
        objects,
        accessible_maps,
    })
}

/// All state a turn intends to write, keyed the way the stores are.
pub struct TurnWrites {
    player_id: CharacterId,
    fallback_map: MapId,
    pub sessions: HashMap<CharacterId, SessionState>,
    pub sheets: HashMap<CharacterId, CharacterSheet>,
    pub maps: HashMap<MapId, MapState>,
    pub world: Option<HashMap<String, serde_json::Value>>,
    pub history: Option<Vec<ConversationEntry>>,
    pub completed: Option<Vec<EventId>>,
    /// True once any delta or overwrite landed on the player; drives the
    /// `character_state_refresh` broadcast.
    pub player_state_touched: bool,
}

impl TurnWrites {
    pub fn new(player_id: CharacterId, fallback_map: MapId) -> Self {
        Self {
            player_id,
            fallback_map,
            sessions: HashMap::new(),
            sheets: HashMap::new(),
            maps: HashMap::new(),
            world: None,
            history: None,
            completed: None,
            player_state_touched: false,
        }
    }

    pub fn player_id(&self) -> &CharacterId {
        &self.player_id
    }

    /// Read-through sheet lookup: buffer, then KV, then catalog. A sheet
    /// first seen via the catalog is buffered so commit refreshes the KV
    /// copy.
    pub async fn sheet(
        &mut self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        id: &CharacterId,
    ) -> Result<Option<CharacterSheet>, StoreError> {
        if let Some(sheet) = self.sheets.get(id) {
            return Ok(Some(sheet.clone()));
        }
        if let Some(sheet) = stores.character_sheet(id).await? {
            return Ok(Some(sheet));
        }
        let Some(sheet) = catalog
            .character_sheet(id)
            .await
            .map_err(catalog_unavailable)?
        else {
            return Ok(None);
        };
        self.sheets.insert(id.clone(), sheet.clone());
        Ok(Some(sheet))
    }

    /// Read-through session lookup with lazy materialization from the
    /// sheet's derived attributes. Returns false when no sheet exists for
    /// the target anywhere.
    pub async fn ensure_session(
        &mut self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        id: &CharacterId,
    ) -> Result<bool, StoreError> {
        if self.sessions.contains_key(id) {
            return Ok(true);
        }
        if let Some(session) = stores.session_state(id).await? {
            self.sessions.insert(id.clone(), session);
            return Ok(true);
        }
        let Some(sheet) = self.sheet(stores, catalog, id).await? else {
            return Ok(false);
        };
        tracing::debug!(character_id = %id, "Materializing session state from sheet");
        let session = SessionState::materialize(&sheet, self.fallback_map);
        self.sessions.insert(id.clone(), session);
        Ok(true)
    }

    /// Read-through map lookup: buffer, then KV, then a catalog rebuild.
    pub async fn map_mut(
        &mut self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        map_id: MapId,
    ) -> Result<&mut MapState, StoreError> {
        if !self.maps.contains_key(&map_id) {
            let state = match stores.map_state(map_id).await? {
                Some(state) => state,
                None => build_map_state(catalog, map_id).await?,
            };
            self.maps.insert(map_id, state);
        }
        self.maps
            .get_mut(&map_id)
            .ok_or_else(|| StoreError::missing("MapState", map_id))
    }

    /// Apply a list of session-state directives (§ state stores).
    ///
    /// Targets resolve at apply time; a target with no sheet anywhere is
    /// skipped with a warning rather than aborting the turn. Numeric deltas
    /// outside the sanity/mp/hp mapping are ignored.
    pub async fn apply_state_changes(
        &mut self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        changes: &[StateChange],
    ) -> Result<(), StoreError> {
        for change in changes {
            let target_id = change.target.resolve(&self.player_id);
            if !self.ensure_session(stores, catalog, &target_id).await? {
                tracing::warn!(
                    target = %target_id,
                    "State change target has no character sheet, skipping"
                );
                continue;
            }
            let is_player = target_id == self.player_id;
            let session = self
                .sessions
                .get_mut(&target_id)
                .ok_or_else(|| StoreError::missing("SessionState", &target_id))?;

            if let (Some(attribute_id), Some(delta)) = (change.attribute_id, change.change) {
                match attribute_id.key() {
                    Ok(key) => match key.session_field() {
                        Some(field) => {
                            let new_value = session.apply_delta(field, delta);
                            tracing::debug!(
                                target = %target_id,
                                field,
                                delta,
                                new_value,
                                "Applied session delta"
                            );
                            if is_player {
                                self.player_state_touched = true;
                            }
                        }
                        None => tracing::warn!(
                            target = %target_id,
                            attribute = key.name(),
                            "Attribute delta outside the session mapping, ignoring"
                        ),
                    },
                    Err(err) => {
                        tracing::warn!(target = %target_id, %err, "Bad attribute id in effect")
                    }
                }
            }

            if let Some(fields) = &change.set_state {
                for (key, value) in fields {
                    session.set_state(key, value.clone());
                }
                if is_player {
                    self.player_state_touched = true;
                }
            }
        }
        Ok(())
    }

    /// Apply accessibility-edge mutations.
    pub async fn apply_map_state_changes(
        &mut self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        change: &MapStateChange,
    ) -> Result<(), StoreError> {
        for edge in &change.modify_location_accessible {
            let map = self.map_mut(stores, catalog, edge.from_map).await?;
            match edge.action {
                EdgeAction::Add => map.add_edge(edge.to_map),
                EdgeAction::Remove => map.remove_edge(edge.to_map),
            }
            tracing::debug!(
                from_map = %edge.from_map,
                to_map = %edge.to_map,
                action = ?edge.action,
                "Applied accessibility change"
            );
        }
        Ok(())
    }

    /// Overlay object-state patches onto a map.
    pub async fn apply_object_state_changes(
        &mut self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        map_id: MapId,
        changes: &[ObjectStateChange],
    ) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        let map = self.map_mut(stores, catalog, map_id).await?;
        for change in changes {
            map.merge_object_state(change.object_id, &change.set_state);
        }
        Ok(())
    }

    /// Merge world-state fields, loading the current world KV on first use.
    pub async fn merge_world_state(
        &mut self,
        stores: &Stores,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        if self.world.is_none() {
            self.world = Some(stores.world_state().await?);
        }
        if let Some(world) = self.world.as_mut() {
            for (key, value) in fields {
                world.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    /// Flush every buffered mutation. Writes are independent per store;
    /// each per-key write is an atomic replace.
    pub async fn commit(self, stores: &Stores) -> Result<(), StoreError> {
        if let Some(world) = &self.world {
            stores.put_world_state(world).await?;
        }
        for (map_id, state) in &self.maps {
            stores.put_map_state(*map_id, state).await?;
        }
        for (id, session) in &self.sessions {
            stores.put_session_state(id, session).await?;
        }
        for (id, sheet) in &self.sheets {
            stores.put_character_sheet(id, sheet).await?;
        }
        if let Some(history) = &self.history {
            stores
                .put_conversation_history(&self.player_id, history)
                .await?;
        }
        if let Some(completed) = &self.completed {
            stores.put_completed_events(&self.player_id, completed).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use keeper_domain::{AttributeId, StateTarget};

    use crate::infrastructure::memory_kv::MemoryKv;
    use crate::test_fixtures::FixtureCatalog;

    fn harness() -> (Stores, FixtureCatalog) {
        (Stores::new(Arc::new(MemoryKv::new())), FixtureCatalog::road_scenario())
    }

    fn delta(target: StateTarget, attribute_id: i64, change: i64) -> StateChange {
        StateChange {
            target,
            attribute_id: Some(AttributeId::new(attribute_id)),
            change: Some(change),
            set_state: None,
        }
    }

    #[tokio::test]
    async fn player_hp_delta_lands_and_marks_refresh() {
        let (stores, catalog) = harness();
        let mut writes = TurnWrites::new(CharacterId::new("investigator"), MapId::new(1));
        writes
            .apply_state_changes(&stores, &catalog, &[delta(StateTarget::Player, 13, -2)])
            .await
            .expect("apply");
        assert!(writes.player_state_touched);
        let session = &writes.sessions[&CharacterId::new("investigator")];
        assert_eq!(session.hp, 10); // 12 on the sheet, -2 applied
        writes.commit(&stores).await.expect("commit");
        let stored = stores
            .require_session_state(&CharacterId::new("investigator"))
            .await
            .expect("session");
        assert_eq!(stored.hp, 10);
    }

    #[tokio::test]
    async fn npc_targets_materialize_with_defaults() {
        let (stores, catalog) = harness();
        let mut writes = TurnWrites::new(CharacterId::new("investigator"), MapId::new(1));
        writes
            .apply_state_changes(
                &stores,
                &catalog,
                &[delta(StateTarget::Npc(CharacterId::new("old_joe")), 10, -5)],
            )
            .await
            .expect("apply");
        // old_joe's fixture sheet has no derived attributes
        let session = &writes.sessions[&CharacterId::new("old_joe")];
        assert_eq!(session.sanity, 45);
        assert!(!writes.player_state_touched);
    }

    #[tokio::test]
    async fn unknown_targets_are_skipped() {
        let (stores, catalog) = harness();
        let mut writes = TurnWrites::new(CharacterId::new("investigator"), MapId::new(1));
        writes
            .apply_state_changes(
                &stores,
                &catalog,
                &[delta(StateTarget::Npc(CharacterId::new("nobody")), 13, -1)],
            )
            .await
            .expect("apply");
        assert!(writes.sessions.is_empty());
    }

    #[tokio::test]
    async fn set_state_overwrites_including_null() {
        let (stores, catalog) = harness();
        let mut writes = TurnWrites::new(CharacterId::new("investigator"), MapId::new(1));
        let mut fields = serde_json::Map::new();
        fields.insert("current_vehicle_id".to_string(), serde_json::Value::Null);
        fields.insert("soaked".to_string(), json!(true));
        writes
            .apply_state_changes(
                &stores,
                &catalog,
                &[StateChange {
                    target: StateTarget::Player,
                    attribute_id: None,
                    change: None,
                    set_state: Some(fields),
                }],
            )
            .await
            .expect("apply");
        let session = &writes.sessions[&CharacterId::new("investigator")];
        assert_eq!(session.current_vehicle_id, None);
        assert_eq!(session.overlay.get("soaked"), Some(&json!(true)));
        assert!(writes.player_state_touched);
    }

    #[tokio::test]
    async fn edge_removal_of_absent_edge_is_noop() {
        let (stores, catalog) = harness();
        let mut writes = TurnWrites::new(CharacterId::new("investigator"), MapId::new(1));
        let change: MapStateChange = serde_json::from_value(json!({
            "modify_location_accessible": [
                {"from_map": 1, "to_map": 9, "action": "remove"}
            ]
        }))
        .expect("change");
        writes
            .apply_map_state_changes(&stores, &catalog, &change)
            .await
            .expect("apply");
        let before = build_map_state(&catalog, MapId::new(1))
            .await
            .expect("map")
            .accessible_maps;
        assert_eq!(writes.maps[&MapId::new(1)].accessible_maps, before);
    }

    #[tokio::test]
    async fn world_merge_buffers_until_commit() {
        let (stores, _catalog) = harness();
        let mut writes = TurnWrites::new(CharacterId::new("investigator"), MapId::new(1));
        let mut fields = serde_json::Map::new();
        fields.insert("storm".to_string(), json!("raging"));
        writes
            .merge_world_state(&stores, &fields)
            .await
            .expect("merge");
        assert!(stores.world_state().await.expect("world").is_empty());
        writes.commit(&stores).await.expect("commit");
        assert_eq!(
            stores.world_state().await.expect("world").get("storm"),
            Some(&json!("raging"))
        );
    }
}
