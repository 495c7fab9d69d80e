//! Shared fixtures: an in-memory catalog seeded with the road scenario, a
//! scripted oracle, and a recording dice sink. Everything here is
//! deterministic so the end-to-end scenarios can pin every roll and reply.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use keeper_domain::{CharacterId, CharacterSheet, EventId, KeeperEvent, MapId};
use keeper_shared::ServerMessage;

use crate::infrastructure::memory_shelf::NullMemoryShelf;
use crate::infrastructure::ports::{
    CatalogError, CatalogObject, CatalogPort, DiceSinkPort, MapInfo, OracleError, OraclePort,
    OracleRequest,
};
use crate::infrastructure::random::ScriptedRandom;
use crate::stores::Stores;
use crate::turn::TurnService;

// =============================================================================
// In-memory catalog
// =============================================================================

/// Catalog double seeded entirely from test data.
pub struct FixtureCatalog {
    pub sheets: Mutex<HashMap<CharacterId, CharacterSheet>>,
    pub maps: HashMap<MapId, MapInfo>,
    pub accessibility: HashMap<MapId, Vec<MapId>>,
    pub npcs: HashMap<MapId, Vec<CharacterId>>,
    pub objects: HashMap<MapId, Vec<CatalogObject>>,
    pub events: Vec<KeeperEvent>,
    pub world: HashMap<String, serde_json::Value>,
    /// (id, map) recorded on every location write-through.
    pub location_log: Mutex<Vec<(CharacterId, MapId)>>,
}

pub fn sheet(blob: serde_json::Value) -> CharacterSheet {
    serde_json::from_value(blob).expect("fixture sheet blob")
}

pub fn event(blob: serde_json::Value) -> KeeperEvent {
    serde_json::from_value(blob).expect("fixture event blob")
}

impl FixtureCatalog {
    /// The opening-road scenario: a stormy highway (map 1) with a drenched
    /// woman, a gas-station cafe (map 2) with its owner, and the road back
    /// to Arkham (map 3).
    pub fn road_scenario() -> Self {
        let investigator = sheet(json!({
            "info": {
                "id": "investigator", "name": "调查员", "if_npc": false,
                "profession": "记者", "current_location_id": 1, "current_vehicle_id": 101
            },
            "attributes": {"dexterity": 60, "intelligence": 70},
            "derived_attributes": {"hit_points": 12, "sanity": 65, "magic_points": 14},
            "skills": {"drive": 60, "investigate": 20}
        }));
        let amelia = sheet(json!({
            "info": {
                "id": "amelia_weber", "name": "湿透的女人", "if_npc": true,
                "profession": "流浪者", "status": "浑身湿透地站在路边",
                "current_goal": "搭上一辆车", "current_location_id": 1
            },
            "attributes": {"dexterity": 70},
            "skills": {"stealth": 80, "investigate": 35}
        }));
        let old_joe = sheet(json!({
            "info": {
                "id": "old_joe", "name": "乔老板", "if_npc": true,
                "profession": "加油站老板", "status": "在柜台后打盹",
                "current_goal": "熬过这个雨夜", "current_location_id": 2
            },
            "attributes": {"dexterity": 40},
            "skills": {"investigate": 70, "stealth": 10}
        }));

        let mut sheets = HashMap::new();
        for s in [investigator, amelia, old_joe] {
            sheets.insert(s.info.id.clone(), s);
        }

        let mut maps = HashMap::new();
        maps.insert(
            MapId::new(1),
            MapInfo {
                id: MapId::new(1),
                name: "阿卡姆郊外公路".to_string(),
                info: "暴雨中的孤寂公路。".to_string(),
            },
        );
        maps.insert(
            MapId::new(2),
            MapInfo {
                id: MapId::new(2),
                name: "加油站咖啡馆".to_string(),
                info: "荒野里唯一亮着灯的地方。".to_string(),
            },
        );
        maps.insert(
            MapId::new(3),
            MapInfo {
                id: MapId::new(3),
                name: "前往阿卡姆的道路".to_string(),
                info: "回城的路。".to_string(),
            },
        );

        let mut accessibility = HashMap::new();
        accessibility.insert(MapId::new(1), vec![MapId::new(2), MapId::new(3)]);
        accessibility.insert(MapId::new(2), vec![MapId::new(1)]);
        accessibility.insert(MapId::new(3), vec![MapId::new(1)]);

        let mut npcs = HashMap::new();
        npcs.insert(MapId::new(1), vec![CharacterId::new("amelia_weber")]);
        npcs.insert(MapId::new(2), vec![CharacterId::new("old_joe")]);
        npcs.insert(MapId::new(3), Vec::new());

        let mut objects = HashMap::new();
        objects.insert(
            MapId::new(1),
            vec![CatalogObject {
                object_id: keeper_domain::ObjectId::new(301),
                name: "抛锚的汽车".to_string(),
                current_state: json!({"engine": "stalled"}),
            }],
        );
        objects.insert(MapId::new(2), Vec::new());
        objects.insert(MapId::new(3), Vec::new());

        let events = vec![
            // Remembering the cafe: no check, unique.
            event(json!({
                "event_id": 5, "map_id": 1, "if_unique": true,
                "event_info": "回忆起附近的加油站咖啡馆",
                "preconditions": {
                    "player_action": {"intent": "use_skill", "skill_check_request": "intelligence"}
                },
                "pre_event_ids": [],
                "effects": {},
                "test_required_id": -1, "hard_level": 1,
                "success_result_info": "你想起来前方不远处有一座加油站咖啡馆，夜里亮着灯。",
                "fail_result_info": ""
            })),
            // Flooring it across the flooded stretch: drive check, hard.
            event(json!({
                "event_id": 7, "map_id": 2, "if_unique": true,
                "event_info": "冲过积水的路面",
                "preconditions": {"player_action": {"intent": "use"}},
                "pre_event_ids": [],
                "effects": {
                    "outcomes": {
                        "suspense_narrative": "引擎嘶吼起来，积水在车灯里白成一片。",
                        "success": {"narrative": "车身一沉又一弹，你冲了过去。"},
                        "failure": {
                            "narrative": "车轮打滑，你的额头撞上了方向盘。",
                            "state_changes": [
                                {"target": "player", "attribute_id": 13, "change": -2}
                            ]
                        }
                    }
                },
                "test_required_id": 22, "hard_level": 2,
                "success_result_info": "你冲了过去。",
                "fail_result_info": "你失控了。"
            })),
            // Abandoning the woman: blocks the road back to Arkham.
            event(json!({
                "event_id": 9, "map_id": 1, "if_unique": true,
                "event_info": "抛下女人离开",
                "preconditions": {"player_action": {"intent": "leave_woman"}},
                "pre_event_ids": [],
                "effects": {
                    "outcomes": {
                        "narrative": "你踩下油门。后视镜里那个身影一动不动。前方的岔路被洪水吞没了。",
                        "map_state_change": {
                            "modify_location_accessible": [
                                {"from_map": 1, "to_map": 3, "action": "remove"}
                            ]
                        }
                    }
                },
                "test_required_id": -1, "hard_level": 1,
                "success_result_info": "",
                "fail_result_info": ""
            })),
        ];

        let mut world = HashMap::new();
        world.insert(
            "opening_narration".to_string(),
            json!("夜幕如同黑色的裹尸布。你正行驶在阿卡姆郊外的公路上，暴雨砸着车顶。"),
        );

        Self {
            sheets: Mutex::new(sheets),
            maps,
            accessibility,
            npcs,
            objects,
            events,
            world,
            location_log: Mutex::new(Vec::new()),
        }
    }

    /// Variant for the perception scenario: both NPCs share the highway so
    /// one can observe the other's private action.
    pub fn perception_scenario() -> Self {
        let mut catalog = Self::road_scenario();
        catalog.npcs.insert(
            MapId::new(1),
            vec![
                CharacterId::new("amelia_weber"),
                CharacterId::new("old_joe"),
            ],
        );
        catalog.events.clear();
        catalog
    }

    pub fn npc_status(&self, id: &str) -> Option<String> {
        self.sheets
            .lock()
            .expect("sheets lock")
            .get(&CharacterId::new(id))
            .map(|sheet| sheet.info.status.clone())
    }
}

#[async_trait]
impl CatalogPort for FixtureCatalog {
    async fn character_sheet(
        &self,
        id: &CharacterId,
    ) -> Result<Option<CharacterSheet>, CatalogError> {
        Ok(self.sheets.lock().expect("sheets lock").get(id).cloned())
    }

    async fn npcs_on_map(&self, map_id: MapId) -> Result<Vec<CharacterId>, CatalogError> {
        Ok(self.npcs.get(&map_id).cloned().unwrap_or_default())
    }

    async fn objects_on_map(&self, map_id: MapId) -> Result<Vec<CatalogObject>, CatalogError> {
        Ok(self.objects.get(&map_id).cloned().unwrap_or_default())
    }

    async fn map_info(&self, map_id: MapId) -> Result<Option<MapInfo>, CatalogError> {
        Ok(self.maps.get(&map_id).cloned())
    }

    async fn accessible_maps(&self, map_id: MapId) -> Result<Vec<MapId>, CatalogError> {
        Ok(self.accessibility.get(&map_id).cloned().unwrap_or_default())
    }

    async fn events_for_map(&self, map_id: MapId) -> Result<Vec<KeeperEvent>, CatalogError> {
        let mut events: Vec<KeeperEvent> = self
            .events
            .iter()
            .filter(|event| event.map_id == map_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.event_id);
        Ok(events)
    }

    async fn event(&self, id: EventId) -> Result<Option<KeeperEvent>, CatalogError> {
        Ok(self
            .events
            .iter()
            .find(|event| event.event_id == id)
            .cloned())
    }

    async fn world_seed(&self) -> Result<HashMap<String, serde_json::Value>, CatalogError> {
        Ok(self.world.clone())
    }

    async fn update_npc_state(
        &self,
        id: &CharacterId,
        status: &str,
        goal: &str,
    ) -> Result<(), CatalogError> {
        let mut sheets = self.sheets.lock().expect("sheets lock");
        if let Some(sheet) = sheets.get_mut(id) {
            sheet.info.status = status.to_string();
            sheet.info.current_goal = goal.to_string();
        }
        Ok(())
    }

    async fn update_character_location(
        &self,
        id: &CharacterId,
        map_id: MapId,
        _vehicle_id: Option<i64>,
    ) -> Result<(), CatalogError> {
        self.location_log
            .lock()
            .expect("location log lock")
            .push((id.clone(), map_id));
        Ok(())
    }
}

// =============================================================================
// Scripted oracle
// =============================================================================

/// Oracle double that replays queued replies in call order and records every
/// request for prompt assertions. A drained queue degrades like a parse
/// failure.
pub struct StubOracle {
    replies: Mutex<VecDeque<serde_json::Value>>,
    pub requests: Mutex<Vec<OracleRequest>>,
}

impl StubOracle {
    pub fn with_replies(replies: impl IntoIterator<Item = serde_json::Value>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_user_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|request| request.user_prompt.clone())
            .collect()
    }
}

#[async_trait]
impl OraclePort for StubOracle {
    async fn generate(&self, request: OracleRequest) -> Result<serde_json::Value, OracleError> {
        self.requests.lock().expect("requests lock").push(request);
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| OracleError::InvalidJson("stub oracle exhausted".to_string()))
    }
}

// =============================================================================
// Recording dice sink
// =============================================================================

#[derive(Default)]
pub struct RecordingDiceSink {
    pub frames: Mutex<Vec<ServerMessage>>,
}

impl RecordingDiceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skill_frames(&self) -> Vec<ServerMessage> {
        self.frames
            .lock()
            .expect("frames lock")
            .iter()
            .filter(|frame| matches!(frame, ServerMessage::SkillCheckResult { .. }))
            .cloned()
            .collect()
    }

    pub fn refresh_frames(&self) -> Vec<ServerMessage> {
        self.frames
            .lock()
            .expect("frames lock")
            .iter()
            .filter(|frame| matches!(frame, ServerMessage::CharacterStateRefresh { .. }))
            .cloned()
            .collect()
    }
}

impl DiceSinkPort for RecordingDiceSink {
    fn push(&self, message: ServerMessage) {
        self.frames.lock().expect("frames lock").push(message);
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Everything a scenario needs, wired over in-memory adapters.
pub struct Harness {
    pub service: TurnService,
    pub stores: Stores,
    pub catalog: Arc<FixtureCatalog>,
    pub oracle: Arc<StubOracle>,
    pub dice: Arc<RecordingDiceSink>,
}

impl Harness {
    pub fn new(
        catalog: FixtureCatalog,
        replies: impl IntoIterator<Item = serde_json::Value>,
        rolls: impl IntoIterator<Item = i64>,
    ) -> Self {
        let stores = Stores::new(Arc::new(crate::infrastructure::memory_kv::MemoryKv::new()));
        let catalog = Arc::new(catalog);
        let oracle = Arc::new(StubOracle::with_replies(replies));
        let dice = Arc::new(RecordingDiceSink::new());
        let service = TurnService::new(
            stores.clone(),
            catalog.clone(),
            oracle.clone(),
            Arc::new(NullMemoryShelf),
            dice.clone(),
            Arc::new(ScriptedRandom::new(rolls)),
        );
        Self {
            service,
            stores,
            catalog,
            oracle,
            dice,
        }
    }

    /// Seed the world KV the way startup does.
    pub async fn seed_world(&self) {
        let seed = self.catalog.world.clone();
        self.stores.put_world_state(&seed).await.expect("seed world");
    }
}
