//! Per-character dynamic state.
//!
//! A session is the mutable counterpart of a character sheet: the values a
//! running game changes turn by turn. It is created lazily the first time a
//! character is touched and expires with the KV TTL.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::character_sheet::CharacterSheet;
use crate::ids::{EventId, MapId};

/// Fallback values when a sheet carries no derived attributes.
const DEFAULT_HP: i64 = 10;
const DEFAULT_SANITY: i64 = 50;
const DEFAULT_MP: i64 = 10;

/// Dynamic state for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub hp: i64,
    pub sanity: i64,
    pub mp: i64,
    pub current_map_id: MapId,
    #[serde(default)]
    pub current_vehicle_id: Option<i64>,
    /// Set while a selected event waits on its skill check; at most one at
    /// any instant.
    #[serde(default)]
    pub pending_check_event_id: Option<EventId>,
    /// Arbitrary keys written by `set_state` effect directives. Null values
    /// are kept (an explicit null is a meaningful overwrite).
    #[serde(flatten)]
    pub overlay: HashMap<String, serde_json::Value>,
}

impl SessionState {
    /// Materialize a fresh session from a sheet's derived attributes.
    ///
    /// Missing derived attributes (zero on a defaulted sheet) fall back to
    /// hp=10, sanity=50, mp=10.
    pub fn materialize(sheet: &CharacterSheet, fallback_map: MapId) -> Self {
        let derived = &sheet.derived_attributes;
        let non_zero = |value: i64, fallback: i64| if value > 0 { value } else { fallback };
        Self {
            hp: non_zero(derived.hit_points, DEFAULT_HP),
            sanity: non_zero(derived.sanity, DEFAULT_SANITY),
            mp: non_zero(derived.magic_points, DEFAULT_MP),
            current_map_id: sheet.info.current_location_id.unwrap_or(fallback_map),
            current_vehicle_id: sheet.info.current_vehicle_id,
            pending_check_event_id: None,
            overlay: HashMap::new(),
        }
    }

    /// Apply a numeric delta to a session-backed field, clamping at zero.
    ///
    /// Returns the new value, or None when the field is not session-backed.
    pub fn apply_delta(&mut self, field: &str, change: i64) -> Option<i64> {
        let slot = match field {
            "hp" => &mut self.hp,
            "sanity" => &mut self.sanity,
            "mp" => &mut self.mp,
            _ => return None,
        };
        *slot = (*slot + change).max(0);
        Some(*slot)
    }

    /// Overwrite an overlay key. Null is stored, not removed.
    pub fn set_state(&mut self, key: &str, value: serde_json::Value) {
        match key {
            "current_map_id" => {
                if let Some(id) = value.as_i64() {
                    self.current_map_id = MapId::new(id);
                    return;
                }
            }
            "current_vehicle_id" => {
                self.current_vehicle_id = value.as_i64();
                return;
            }
            "pending_check_event_id" => {
                self.pending_check_event_id = value.as_i64().map(EventId::new);
                return;
            }
            _ => {}
        }
        self.overlay.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character_sheet::CharacterSheet;

    fn bare_sheet(id: &str) -> CharacterSheet {
        serde_json::from_value(serde_json::json!({
            "info": {"id": id, "name": id, "if_npc": true}
        }))
        .expect("valid sheet blob")
    }

    #[test]
    fn materialize_uses_documented_defaults() {
        let session = SessionState::materialize(&bare_sheet("old_joe"), MapId::new(2));
        assert_eq!(session.hp, 10);
        assert_eq!(session.sanity, 50);
        assert_eq!(session.mp, 10);
        assert_eq!(session.current_map_id, MapId::new(2));
        assert!(session.pending_check_event_id.is_none());
    }

    #[test]
    fn materialize_prefers_sheet_values() {
        let mut sheet = bare_sheet("amelia_weber");
        sheet.derived_attributes.hit_points = 9;
        sheet.derived_attributes.sanity = 55;
        sheet.derived_attributes.magic_points = 12;
        sheet.info.current_location_id = Some(MapId::new(1));
        let session = SessionState::materialize(&sheet, MapId::new(7));
        assert_eq!((session.hp, session.sanity, session.mp), (9, 55, 12));
        assert_eq!(session.current_map_id, MapId::new(1));
    }

    #[test]
    fn deltas_clamp_at_zero() {
        let mut session = SessionState::materialize(&bare_sheet("x"), MapId::new(1));
        assert_eq!(session.apply_delta("hp", -99), Some(0));
        assert_eq!(session.apply_delta("sanity", -5), Some(45));
        assert_eq!(session.apply_delta("luck", -5), None);
    }

    #[test]
    fn set_state_keeps_explicit_null() {
        let mut session = SessionState::materialize(&bare_sheet("x"), MapId::new(1));
        session.set_state("injured_leg", serde_json::Value::Null);
        assert_eq!(
            session.overlay.get("injured_leg"),
            Some(&serde_json::Value::Null)
        );
    }

    #[test]
    fn set_state_routes_known_fields() {
        let mut session = SessionState::materialize(&bare_sheet("x"), MapId::new(1));
        session.set_state("current_map_id", serde_json::json!(3));
        session.set_state("pending_check_event_id", serde_json::json!(7));
        assert_eq!(session.current_map_id, MapId::new(3));
        assert_eq!(session.pending_check_event_id, Some(EventId::new(7)));
        session.set_state("pending_check_event_id", serde_json::Value::Null);
        assert!(session.pending_check_event_id.is_none());
    }

    #[test]
    fn overlay_round_trips_through_json() {
        let mut session = SessionState::materialize(&bare_sheet("x"), MapId::new(1));
        session.set_state("soaked", serde_json::json!(true));
        let json = serde_json::to_string(&session).expect("serialize");
        let back: SessionState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, session);
    }
}
