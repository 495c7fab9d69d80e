//! Scripted scenario events and their outcome payloads.
//!
//! An event is a beat keyed to a map, gated by structured preconditions and
//! topological prerequisites, optionally guarded by a skill check, and
//! carrying the state mutations of its success/failure branches.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::action::PlayerAction;
use crate::attributes::AttributeId;
use crate::check::Difficulty;
use crate::ids::{CharacterId, EventId, MapId, ObjectId};
use crate::session::SessionState;

/// One catalog event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeeperEvent {
    pub event_id: EventId,
    pub map_id: MapId,
    #[serde(default)]
    pub event_info: String,
    /// Structured precondition object, matched field-by-field (§ trigger).
    #[serde(default)]
    pub preconditions: serde_json::Value,
    /// Every listed id must already be completed before this event can fire.
    #[serde(default)]
    pub pre_event_ids: Vec<EventId>,
    #[serde(default)]
    pub if_unique: bool,
    #[serde(default)]
    pub effects: EventEffects,
    /// Attribute id of the gating check, or None when the event fires
    /// directly. Catalog rows encode "no check" as -1.
    #[serde(
        default,
        deserialize_with = "de_test_required_id",
        serialize_with = "ser_test_required_id"
    )]
    pub test_required_id: Option<AttributeId>,
    #[serde(default)]
    pub hard_level: Difficulty,
    #[serde(default)]
    pub success_result_info: String,
    #[serde(default)]
    pub fail_result_info: String,
}

impl KeeperEvent {
    /// Topological gate: all prerequisites appear in the completed list.
    pub fn prerequisites_met(&self, completed: &[EventId]) -> bool {
        self.pre_event_ids.iter().all(|id| completed.contains(id))
    }

    /// Uniqueness gate: a unique event that already fired is rejected.
    pub fn uniqueness_ok(&self, completed: &[EventId]) -> bool {
        !(self.if_unique && completed.contains(&self.event_id))
    }

    /// The check guarding this event, if any.
    ///
    /// The effects block may pin the check to a specific character and
    /// override difficulty; the catalog columns are the default.
    pub fn check_gate(&self) -> Option<SkillCheckSpec> {
        if let Some(spec) = &self.effects.skill_check {
            if spec.required {
                return Some(spec.clone());
            }
            return None;
        }
        self.test_required_id.map(|skill_id| SkillCheckSpec {
            required: true,
            skill_id,
            difficulty: self.hard_level,
            character_id: None,
        })
    }

    pub fn preconditions(&self) -> Preconditions {
        Preconditions::parse(&self.preconditions)
    }
}

// =============================================================================
// Effects payload (stored as JSON in the events table)
// =============================================================================

/// The `effects` column payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventEffects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_check: Option<SkillCheckSpec>,
    #[serde(default)]
    pub outcomes: Outcomes,
}

impl EventEffects {
    pub fn suspense_narrative(&self) -> Option<&str> {
        match &self.outcomes {
            Outcomes::Checked(checked) => checked.suspense_narrative.as_deref(),
            Outcomes::Flat(_) => None,
        }
    }

    /// The outcome block for one branch. A flat payload applies to both.
    pub fn outcome_for(&self, success: bool) -> Option<&OutcomeBlock> {
        match &self.outcomes {
            Outcomes::Checked(checked) => {
                if success {
                    checked.success.as_ref()
                } else {
                    checked.failure.as_ref()
                }
            }
            Outcomes::Flat(block) => Some(block),
        }
    }
}

/// Skill check request embedded in an effects payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCheckSpec {
    #[serde(default)]
    pub required: bool,
    pub skill_id: AttributeId,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Check on someone other than the player. Catalog payloads encode this
    /// as either a string id or a bare number.
    #[serde(default, deserialize_with = "de_opt_character_id")]
    pub character_id: Option<CharacterId>,
}

/// Branching structure of an effects payload: either a suspense/success/
/// failure triple around a check, or one flat block when no check applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcomes {
    Checked(CheckedOutcomes),
    Flat(OutcomeBlock),
}

impl Default for Outcomes {
    fn default() -> Self {
        Self::Flat(OutcomeBlock::default())
    }
}

/// Suspense + branch blocks for a checked event.
///
/// Unknown fields are rejected so that a flat outcome block falls through to
/// the `Flat` variant during untagged deserialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckedOutcomes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspense_narrative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<OutcomeBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<OutcomeBlock>,
}

/// All state mutations attributable to one branch of one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutcomeBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_injection: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_changes: Vec<StateChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub npc_state_change: Vec<NpcStateChange>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub world_state_change: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_state_change: Option<MapStateChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_state_change: Vec<ObjectStateChange>,
}

impl OutcomeBlock {
    /// True when applying this block cannot touch any store.
    pub fn is_noop(&self) -> bool {
        self.narrative.is_none()
            && self.narrative_injection.is_none()
            && self.state_changes.is_empty()
            && self.npc_state_change.is_empty()
            && self.world_state_change.is_empty()
            && self.map_state_change.is_none()
            && self.object_state_change.is_empty()
    }
}

/// One session-state directive: a numeric delta or an overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub target: StateTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_id: Option<AttributeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_state: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Whose session a state change addresses. "player" resolves to the turn's
/// player at apply time; anything else is an NPC id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateTarget {
    Player,
    Npc(CharacterId),
}

impl StateTarget {
    pub fn resolve(&self, player_id: &CharacterId) -> CharacterId {
        match self {
            Self::Player => player_id.clone(),
            Self::Npc(id) => id.clone(),
        }
    }
}

impl Serialize for StateTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Player => serializer.serialize_str("player"),
            Self::Npc(id) => serializer.serialize_str(id.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for StateTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw == "player" {
            Self::Player
        } else {
            Self::Npc(CharacterId::new(raw))
        })
    }
}

/// Sheet status write-through for one NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcStateChange {
    pub character_id: CharacterId,
    pub new_status: String,
}

/// Map mutations carried by an outcome block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapStateChange {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modify_location_accessible: Vec<MapEdgeChange>,
}

/// One directed accessibility edge mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEdgeChange {
    pub from_map: MapId,
    pub to_map: MapId,
    pub action: EdgeAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeAction {
    Add,
    Remove,
}

/// Object-state overlay for one interactable object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStateChange {
    pub object_id: ObjectId,
    pub set_state: serde_json::Value,
}

fn de_test_required_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<AttributeId>, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.filter(|id| *id != -1).map(AttributeId::new))
}

fn ser_test_required_id<S: serde::Serializer>(
    value: &Option<AttributeId>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    // Mirror the catalog convention: no check is encoded as -1.
    serializer.serialize_i64(value.map_or(-1, |id| id.value()))
}

fn de_opt_character_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<CharacterId>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(CharacterId::new(s))),
        Some(serde_json::Value::Number(n)) => Ok(Some(CharacterId::new(n.to_string()))),
        Some(other) => Err(D::Error::custom(format!(
            "character_id must be a string or number, got {other}"
        ))),
    }
}

// =============================================================================
// Precondition matching
// =============================================================================

/// Parsed view of an event's structured precondition object.
///
/// ```json
/// {
///   "player_action": {"intent": "talk", "target": "amelia_weber"},
///   "agent_id": "amelia_weber",
///   "agent_state": {"current_location_id": 2}
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    pub player_action: serde_json::Map<String, serde_json::Value>,
    pub agent_state: serde_json::Map<String, serde_json::Value>,
    /// Session the agent_state conditions address; None means the player.
    pub agent_id: Option<CharacterId>,
}

impl Preconditions {
    pub fn parse(raw: &serde_json::Value) -> Self {
        let object = |key: &str| {
            raw.get(key)
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default()
        };
        Self {
            player_action: object("player_action"),
            agent_state: object("agent_state"),
            agent_id: raw
                .get("agent_id")
                .and_then(|v| v.as_str())
                .map(CharacterId::new),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.player_action.is_empty() && self.agent_state.is_empty()
    }

    /// Field-by-field comparison against the parsed player action.
    ///
    /// `skill_check_request` accepts either full-list equality or a single
    /// required entry.
    pub fn action_satisfied(&self, action: &PlayerAction) -> bool {
        let actual = match serde_json::to_value(action) {
            Ok(value) => value,
            Err(_) => return false,
        };
        self.player_action.iter().all(|(field, expected)| {
            let got = actual.get(field).unwrap_or(&serde_json::Value::Null);
            if field == "skill_check_request" {
                if let (Some(want), Some(have)) = (expected.as_str(), got.as_array()) {
                    return have.iter().any(|v| v.as_str() == Some(want));
                }
            }
            got == expected
        })
    }

    /// Field-by-field comparison against an agent's session state.
    ///
    /// `current_location_id` compares against the session's current map.
    pub fn session_satisfied(&self, session: &SessionState) -> bool {
        self.agent_state.iter().all(|(field, expected)| {
            let got = match field.as_str() {
                "current_location_id" | "current_map_id" => {
                    serde_json::json!(session.current_map_id)
                }
                "current_vehicle_id" => serde_json::json!(session.current_vehicle_id),
                "hp" => serde_json::json!(session.hp),
                "sanity" => serde_json::json!(session.sanity),
                "mp" => serde_json::json!(session.mp),
                "pending_check_event_id" => serde_json::json!(session.pending_check_event_id),
                other => session
                    .overlay
                    .get(other)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
            };
            &got == expected
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Intent;
    use serde_json::json;

    fn event_json(effects: serde_json::Value) -> KeeperEvent {
        serde_json::from_value(json!({
            "event_id": 7,
            "map_id": 2,
            "event_info": "the flooded bridge",
            "pre_event_ids": [5],
            "if_unique": true,
            "effects": effects,
            "test_required_id": 22,
            "hard_level": 2,
            "success_result_info": "you make it across",
            "fail_result_info": "the car slides"
        }))
        .expect("valid event blob")
    }

    #[test]
    fn checked_outcomes_deserialize_with_branches() {
        let event = event_json(json!({
            "skill_check": {"required": true, "skill_id": 22, "difficulty": 2},
            "outcomes": {
                "suspense_narrative": "the engine screams",
                "success": {"narrative": "across"},
                "failure": {
                    "narrative": "crash",
                    "state_changes": [
                        {"target": "player", "attribute_id": 13, "change": -2}
                    ]
                }
            }
        }));
        assert_eq!(event.effects.suspense_narrative(), Some("the engine screams"));
        let failure = event.effects.outcome_for(false).expect("failure branch");
        assert_eq!(failure.state_changes[0].change, Some(-2));
        let gate = event.check_gate().expect("check gate");
        assert_eq!(gate.skill_id, AttributeId::new(22));
        assert_eq!(gate.difficulty, Difficulty::Hard);
    }

    #[test]
    fn flat_outcomes_apply_to_both_branches() {
        let event = event_json(json!({
            "outcomes": {
                "narrative": "it simply happens",
                "world_state_change": {"road_blocked": true}
            }
        }));
        let success = event.effects.outcome_for(true).expect("block");
        let failure = event.effects.outcome_for(false).expect("block");
        assert_eq!(success, failure);
        assert_eq!(success.narrative.as_deref(), Some("it simply happens"));
        assert!(event.effects.suspense_narrative().is_none());
    }

    #[test]
    fn state_target_parses_player_and_npc() {
        let change: StateChange = serde_json::from_value(json!({
            "target": "old_joe",
            "set_state": {"mood": "wary"}
        }))
        .expect("valid change");
        assert_eq!(change.target, StateTarget::Npc(CharacterId::new("old_joe")));
        assert_eq!(
            StateTarget::Player.resolve(&CharacterId::new("pc_1")),
            CharacterId::new("pc_1")
        );
    }

    #[test]
    fn skill_check_character_id_accepts_numbers() {
        let spec: SkillCheckSpec = serde_json::from_value(json!({
            "required": true, "skill_id": 24, "difficulty": 1, "character_id": 42
        }))
        .expect("valid spec");
        assert_eq!(spec.character_id, Some(CharacterId::new("42")));
    }

    #[test]
    fn minus_one_encodes_no_check() {
        let event: KeeperEvent = serde_json::from_value(json!({
            "event_id": 5, "map_id": 1, "effects": {}, "test_required_id": -1
        }))
        .expect("event");
        assert!(event.test_required_id.is_none());
        assert!(event.check_gate().is_none());
        let back = serde_json::to_value(&event).expect("serialize");
        assert_eq!(back["test_required_id"], -1);
    }

    #[test]
    fn prerequisites_and_uniqueness_gates() {
        let event = event_json(json!({}));
        assert!(!event.prerequisites_met(&[]));
        assert!(event.prerequisites_met(&[EventId::new(5)]));
        assert!(event.uniqueness_ok(&[EventId::new(5)]));
        assert!(!event.uniqueness_ok(&[EventId::new(7)]));
    }

    #[test]
    fn action_preconditions_match_field_by_field() {
        let pre = Preconditions::parse(&json!({
            "player_action": {"intent": "use_skill", "skill_check_request": "intelligence"}
        }));
        let mut action = PlayerAction::unknown("");
        action.intent = Intent::UseSkill;
        action.skill_check_request = Some(vec!["intelligence".to_string()]);
        assert!(pre.action_satisfied(&action));

        action.skill_check_request = Some(vec!["occult".to_string()]);
        assert!(!pre.action_satisfied(&action));
    }

    #[test]
    fn session_preconditions_alias_location() {
        use crate::ids::MapId;
        let pre = Preconditions::parse(&json!({
            "agent_id": "amelia_weber",
            "agent_state": {"current_location_id": 2}
        }));
        assert_eq!(pre.agent_id, Some(CharacterId::new("amelia_weber")));
        let sheet = serde_json::from_value(json!({
            "info": {"id": "amelia_weber", "name": "Amelia", "if_npc": true}
        }))
        .expect("sheet");
        let mut session = SessionState::materialize(&sheet, MapId::new(2));
        assert!(pre.session_satisfied(&session));
        session.current_map_id = MapId::new(1);
        assert!(!pre.session_satisfied(&session));
    }

    #[test]
    fn noop_block_reports_noop() {
        assert!(OutcomeBlock::default().is_noop());
        let block: OutcomeBlock =
            serde_json::from_value(json!({"narrative_injection": "x"})).expect("block");
        assert!(!block.is_noop());
    }
}
