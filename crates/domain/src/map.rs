//! Dynamic per-map state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, MapId, ObjectId};

/// Mutable state of one map: who is there, what the interactable objects
/// currently look like, and which maps can be reached from here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapState {
    #[serde(default)]
    pub npcs: Vec<CharacterId>,
    #[serde(default)]
    pub objects: HashMap<ObjectId, serde_json::Value>,
    #[serde(default)]
    pub accessible_maps: Vec<MapId>,
}

impl MapState {
    pub fn is_accessible(&self, target: MapId) -> bool {
        self.accessible_maps.contains(&target)
    }

    /// Add an outgoing accessibility edge. Adding a present edge is a no-op.
    pub fn add_edge(&mut self, to: MapId) {
        if !self.accessible_maps.contains(&to) {
            self.accessible_maps.push(to);
        }
    }

    /// Remove an outgoing accessibility edge. Removing an absent edge is a
    /// no-op.
    pub fn remove_edge(&mut self, to: MapId) {
        self.accessible_maps.retain(|id| *id != to);
    }

    /// Overlay new fields onto an object's current state blob.
    ///
    /// Unknown object ids insert a fresh blob; non-object current states are
    /// replaced wholesale.
    pub fn merge_object_state(&mut self, object_id: ObjectId, patch: &serde_json::Value) {
        let entry = self
            .objects
            .entry(object_id)
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        match (entry.as_object_mut(), patch.as_object()) {
            (Some(current), Some(fields)) => {
                for (key, value) in fields {
                    current.insert(key.clone(), value.clone());
                }
            }
            _ => *entry = patch.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_add_is_idempotent() {
        let mut map = MapState::default();
        map.add_edge(MapId::new(2));
        map.add_edge(MapId::new(2));
        assert_eq!(map.accessible_maps, vec![MapId::new(2)]);
    }

    #[test]
    fn removing_an_absent_edge_is_a_noop() {
        let mut map = MapState {
            accessible_maps: vec![MapId::new(2)],
            ..MapState::default()
        };
        map.remove_edge(MapId::new(9));
        assert_eq!(map.accessible_maps, vec![MapId::new(2)]);
        map.remove_edge(MapId::new(2));
        assert!(map.accessible_maps.is_empty());
    }

    #[test]
    fn object_state_merges_field_by_field() {
        let mut map = MapState::default();
        let id = ObjectId::new(301);
        map.merge_object_state(id, &serde_json::json!({"locked": true, "fuel": 3}));
        map.merge_object_state(id, &serde_json::json!({"locked": false}));
        assert_eq!(
            map.objects.get(&id),
            Some(&serde_json::json!({"locked": false, "fuel": 3}))
        );
    }

    #[test]
    fn non_object_state_is_replaced_wholesale() {
        let mut map = MapState::default();
        let id = ObjectId::new(302);
        map.objects.insert(id, serde_json::json!("jammed"));
        map.merge_object_state(id, &serde_json::json!({"jammed": false}));
        assert_eq!(map.objects.get(&id), Some(&serde_json::json!({"jammed": false})));
    }
}
