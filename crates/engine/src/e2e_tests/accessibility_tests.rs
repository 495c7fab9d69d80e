//! Map accessibility mutation and move validation.

use serde_json::json;

use keeper_domain::{CharacterId, EventId, MapId};

use crate::test_fixtures::{FixtureCatalog, Harness};

fn investigator() -> CharacterId {
    CharacterId::new("investigator")
}

#[tokio::test]
async fn event_can_sever_an_edge_and_block_the_move() {
    let harness = Harness::new(
        FixtureCatalog::road_scenario(),
        [
            // Turn 1: abandoning the woman removes the 1 -> 3 edge.
            json!({"intent": "leave_woman"}),
            json!({"visibility": "public", "dialogue": "", "action": "在雨里站着，没有动"}),
            // Turn 2: trying to drive back to Arkham anyway.
            json!({"intent": "move", "target": "阿卡姆", "target_location_id": 3}),
            json!({"should_trigger": false, "event_id": null, "confidence": "low"}),
            json!({"visibility": "public", "dialogue": "", "action": "已经看不见了"}),
            json!({"narrative": "你调转车头，车灯扫过一片浑浊的洪水。"}),
        ],
        [],
    );
    harness.seed_world().await;

    // ---- Turn 1: the event fires and rewrites the map ---------------------
    harness
        .service
        .run_turn(&investigator(), "我开车走了，不管她了。")
        .await
        .expect("turn 1");

    let map_one = harness
        .stores
        .require_map_state(MapId::new(1))
        .await
        .expect("map 1");
    assert!(!map_one.is_accessible(MapId::new(3)));
    assert!(map_one.is_accessible(MapId::new(2)));
    assert_eq!(
        harness
            .stores
            .completed_events(&investigator())
            .await
            .expect("completed"),
        vec![EventId::new(9)]
    );

    // ---- Turn 2: the move to map 3 is refused -----------------------------
    let second = harness
        .service
        .run_turn(&investigator(), "我要回阿卡姆")
        .await
        .expect("turn 2");
    assert!(second.reply.contains("无法通行"));

    let session = harness
        .stores
        .require_session_state(&investigator())
        .await
        .expect("session");
    assert_eq!(session.current_map_id, MapId::new(1));
}

#[tokio::test]
async fn valid_moves_relocate_and_load_the_new_map() {
    let harness = Harness::new(
        FixtureCatalog::road_scenario(),
        [
            json!({"intent": "move", "target": "加油站咖啡馆", "target_location_id": 2}),
            json!({"should_trigger": false, "event_id": null, "confidence": "low"}),
            json!({"visibility": "public", "dialogue": "别丢下我！", "action": "追着车跑了两步"}),
            json!({"narrative": "你握紧方向盘，朝着那点灯光驶去。"}),
        ],
        [],
    );
    harness.seed_world().await;

    let outcome = harness
        .service
        .run_turn(&investigator(), "我开去加油站咖啡馆")
        .await
        .expect("turn");
    assert!(outcome.reply.contains("加油站咖啡馆"));

    let session = harness
        .stores
        .require_session_state(&investigator())
        .await
        .expect("session");
    assert_eq!(session.current_map_id, MapId::new(2));

    // The destination's state and its NPC sessions were bootstrapped.
    let map_two = harness
        .stores
        .require_map_state(MapId::new(2))
        .await
        .expect("map 2");
    assert_eq!(map_two.npcs, vec![CharacterId::new("old_joe")]);
    assert!(harness
        .stores
        .session_state(&CharacterId::new("old_joe"))
        .await
        .expect("joe session")
        .is_some());

    // The catalog heard about the relocation.
    let log = harness.catalog.location_log.lock().expect("log");
    assert!(log.contains(&(investigator(), MapId::new(2))));
}
