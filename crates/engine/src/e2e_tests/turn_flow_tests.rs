//! Idle turns, no-check events, and turn serialization.

use serde_json::json;

use keeper_domain::{CharacterId, EventId, Role};

use crate::test_fixtures::{FixtureCatalog, Harness};

fn investigator() -> CharacterId {
    CharacterId::new("investigator")
}

#[tokio::test]
async fn idle_turn_yields_pure_atmosphere() {
    // Scenario: no hard precondition matches and the soft matcher declines.
    let harness = Harness::new(
        FixtureCatalog::road_scenario(),
        [
            json!({"intent": "inspect"}),
            json!({"should_trigger": false, "event_id": null, "confidence": "low"}),
            json!({"visibility": "public", "dialogue": "请……请帮帮我。", "action": "朝车灯走近了一步"}),
            json!({"narrative": "雨刷徒劳地扫着，挡风玻璃外只有白茫茫的一片。"}),
        ],
        [],
    );
    harness.seed_world().await;

    let outcome = harness
        .service
        .run_turn(&investigator(), "我四处看看")
        .await
        .expect("turn");

    assert!(outcome.reply.contains("白茫茫"));
    assert!(outcome.reply.contains("请帮帮我"));
    assert!(harness
        .stores
        .completed_events(&investigator())
        .await
        .expect("completed")
        .is_empty());
    assert!(harness.dice.skill_frames().is_empty());

    // Opening narration seeds the log, then exactly one player/keeper pair.
    let history = harness
        .stores
        .conversation_history(&investigator())
        .await
        .expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].role, Role::Keeper);
    assert_eq!(history[1].role, Role::Player);
    assert_eq!(history[2].role, Role::Keeper);
}

#[tokio::test]
async fn no_check_event_fires_and_completes_once() {
    // Scenario: intent matches event 5's preconditions; no check gate.
    let harness = Harness::new(
        FixtureCatalog::road_scenario(),
        [
            json!({"intent": "use_skill", "skill_check_request": ["intelligence"]}),
            json!({"visibility": "public", "dialogue": "", "action": "缩在雨里等着"}),
        ],
        [],
    );
    harness.seed_world().await;

    let outcome = harness
        .service
        .run_turn(&investigator(), "我要尝试回忆附近有什么地方")
        .await
        .expect("turn");

    assert!(outcome.reply.contains("加油站咖啡馆"));
    assert_eq!(
        harness
            .stores
            .completed_events(&investigator())
            .await
            .expect("completed"),
        vec![EventId::new(5)]
    );
    // Event 5 carries no check and no deltas.
    assert!(harness.dice.skill_frames().is_empty());
    assert!(harness.dice.refresh_frames().is_empty());
}

#[tokio::test]
async fn completed_events_never_shrink() {
    let harness = Harness::new(
        FixtureCatalog::road_scenario(),
        [
            json!({"intent": "use_skill", "skill_check_request": ["intelligence"]}),
            json!({"visibility": "public", "dialogue": "", "action": "望着你"}),
            // Second turn: the unique event is spent, soft matcher declines.
            json!({"intent": "use_skill", "skill_check_request": ["intelligence"]}),
            json!({"should_trigger": false, "event_id": null, "confidence": "low"}),
            json!({"visibility": "public", "dialogue": "", "action": "望着你"}),
            json!({"narrative": "没有新的念头浮现。"}),
        ],
        // Second turn rolls an ad-hoc intelligence check.
        [30],
    );
    harness.seed_world().await;

    harness
        .service
        .run_turn(&investigator(), "我要尝试回忆附近有什么地方")
        .await
        .expect("first turn");
    let after_first = harness
        .stores
        .completed_events(&investigator())
        .await
        .expect("completed");

    harness
        .service
        .run_turn(&investigator(), "我再想想还有什么地方")
        .await
        .expect("second turn");
    let after_second = harness
        .stores
        .completed_events(&investigator())
        .await
        .expect("completed");

    assert_eq!(after_first, vec![EventId::new(5)]);
    // Monotone: the unique event stays exactly once.
    assert_eq!(after_second, after_first);
    // The second attempt degraded to an ad-hoc check instead.
    assert_eq!(harness.dice.skill_frames().len(), 1);
}

#[tokio::test]
async fn concurrent_turns_for_one_character_conflict() {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::infrastructure::memory_kv::MemoryKv;
    use crate::infrastructure::memory_shelf::NullMemoryShelf;
    use crate::infrastructure::ports::{OracleError, OraclePort, OracleRequest};
    use crate::infrastructure::random::ScriptedRandom;
    use crate::stores::Stores;
    use crate::test_fixtures::RecordingDiceSink;
    use crate::turn::{TurnError, TurnService};

    /// Blocks the first turn inside its oracle call until released.
    struct GatedOracle {
        release: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl OraclePort for GatedOracle {
        async fn generate(&self, _request: OracleRequest) -> Result<serde_json::Value, OracleError> {
            let _permit = self.release.acquire().await;
            Ok(json!({"intent": "unknown"}))
        }
    }

    let stores = Stores::new(Arc::new(MemoryKv::new()));
    let catalog = Arc::new(FixtureCatalog::road_scenario());
    let oracle = Arc::new(GatedOracle {
        release: tokio::sync::Semaphore::new(0),
    });
    let service = Arc::new(TurnService::new(
        stores,
        catalog,
        oracle.clone(),
        Arc::new(NullMemoryShelf),
        Arc::new(RecordingDiceSink::new()),
        Arc::new(ScriptedRandom::new([])),
    ));

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.run_turn(&investigator(), "我四处看看").await })
    };
    // Let the first turn reach its oracle suspension point.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = service.run_turn(&investigator(), "我继续看").await;
    assert!(matches!(second, Err(TurnError::TurnInFlight)));

    // Release the first turn; it finishes normally.
    oracle.release.add_permits(16);
    first.await.expect("join").expect("first turn");
}

#[tokio::test]
async fn missing_character_aborts_without_writes() {
    let harness = Harness::new(FixtureCatalog::road_scenario(), [], []);
    let ghost = CharacterId::new("ghost");
    let err = harness
        .service
        .run_turn(&ghost, "你好？")
        .await
        .expect_err("missing sheet");
    assert!(matches!(
        err,
        crate::turn::TurnError::EntityMissing { .. }
    ));
    assert!(harness
        .stores
        .conversation_history(&ghost)
        .await
        .expect("history")
        .is_empty());
}
