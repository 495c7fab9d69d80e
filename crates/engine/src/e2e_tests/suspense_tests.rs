//! Checked events: suspense on turn one, resolution on turn two.

use serde_json::json;

use keeper_domain::{CharacterId, EventId, MapId, SessionState};
use keeper_shared::ServerMessage;

use crate::infrastructure::ports::CatalogPort;
use crate::test_fixtures::{FixtureCatalog, Harness};

fn investigator() -> CharacterId {
    CharacterId::new("investigator")
}

/// Place the investigator on the flooded stretch (map 2).
async fn start_on_map_two(harness: &Harness) {
    let sheet = harness
        .catalog
        .character_sheet(&investigator())
        .await
        .expect("catalog")
        .expect("sheet");
    let mut session = SessionState::materialize(&sheet, MapId::new(1));
    session.current_map_id = MapId::new(2);
    harness
        .stores
        .put_session_state(&investigator(), &session)
        .await
        .expect("seed session");
}

#[tokio::test]
async fn checked_event_suspends_then_succeeds() {
    let harness = Harness::new(
        FixtureCatalog::road_scenario(),
        [
            // Turn 1: the action matches event 7, which carries a drive check.
            json!({"intent": "use", "target": "car"}),
            // Turn 2: any input resolves the pending check first.
            json!({"intent": "unknown"}),
            json!({"visibility": "public", "dialogue": "疯子……", "action": "隔着玻璃看着你"}),
        ],
        // drive 60 at hard difficulty -> threshold 30; 20 succeeds.
        [20],
    );
    harness.seed_world().await;
    start_on_map_two(&harness).await;

    // ---- Turn 1: suspense only -------------------------------------------
    let first = harness
        .service
        .run_turn(&investigator(), "我踩下油门冲过去")
        .await
        .expect("turn 1");
    assert!(first.reply.contains("引擎嘶吼"));
    let session = harness
        .stores
        .require_session_state(&investigator())
        .await
        .expect("session");
    assert_eq!(session.pending_check_event_id, Some(EventId::new(7)));
    // No dice rolled yet: the check is only announced.
    assert!(harness.dice.skill_frames().is_empty());

    // ---- Turn 2: resolution ----------------------------------------------
    let second = harness
        .service
        .run_turn(&investigator(), "怎么样了？")
        .await
        .expect("turn 2");
    assert!(second.reply.contains("冲了过去"));

    let session = harness
        .stores
        .require_session_state(&investigator())
        .await
        .expect("session");
    assert_eq!(session.pending_check_event_id, None);
    assert_eq!(
        harness
            .stores
            .completed_events(&investigator())
            .await
            .expect("completed"),
        vec![EventId::new(7)]
    );

    let frames = harness.dice.skill_frames();
    assert_eq!(frames.len(), 1);
    assert!(matches!(
        &frames[0],
        ServerMessage::SkillCheckResult {
            skill_name,
            dice_roll: 20,
            threshold: 30,
            success: true,
            hard_level: 2,
        } if skill_name == "drive"
    ));
}

#[tokio::test]
async fn checked_event_failure_applies_the_failure_branch() {
    let harness = Harness::new(
        FixtureCatalog::road_scenario(),
        [
            json!({"intent": "use", "target": "car"}),
            json!({"intent": "unknown"}),
            json!({"visibility": "public", "dialogue": "", "action": "摇了摇头"}),
        ],
        // 80 against threshold 30 fails.
        [80],
    );
    harness.seed_world().await;
    start_on_map_two(&harness).await;

    harness
        .service
        .run_turn(&investigator(), "我踩下油门冲过去")
        .await
        .expect("turn 1");
    let second = harness
        .service
        .run_turn(&investigator(), "……")
        .await
        .expect("turn 2");
    assert!(second.reply.contains("撞上了方向盘"));

    // Failure branch: hp 12 - 2, clamped state machine bookkeeping done.
    let session = harness
        .stores
        .require_session_state(&investigator())
        .await
        .expect("session");
    assert_eq!(session.hp, 10);
    assert_eq!(session.pending_check_event_id, None);
    assert_eq!(
        harness
            .stores
            .completed_events(&investigator())
            .await
            .expect("completed"),
        vec![EventId::new(7)]
    );

    let frames = harness.dice.skill_frames();
    assert_eq!(frames.len(), 1);
    assert!(matches!(
        &frames[0],
        ServerMessage::SkillCheckResult { success: false, .. }
    ));
    // The player's state changed, so a refresh frame went out.
    assert!(!harness.dice.refresh_frames().is_empty());
}
