//! The Turn Orchestrator.
//!
//! One call to [`TurnService::run_turn`] is one logical state transition:
//! parse intent, resolve or select at most one event, run the NPC reactor
//! fan-out, synthesize the keeper reply, commit. Stages run strictly in
//! order; oracle and store calls are the only suspension points. Nothing is
//! written until the single commit at the end.

pub mod check;
pub mod intent;
pub mod locks;
pub mod npc;
pub mod synthesis;
pub mod trigger;

use std::sync::Arc;

use keeper_domain::{
    AttributeKey, CharacterId, CharacterSheet, ConversationEntry, Difficulty, EventId, Intent,
    KeeperEvent, MapId, MapState, SkillCheckOutcome,
};
use keeper_shared::ServerMessage;

use crate::infrastructure::ports::{
    CatalogError, CatalogPort, DiceSinkPort, MemoryPort, OraclePort, RandomPort,
};
use crate::stores::{StoreError, Stores, TurnWrites};

use check::CheckResolver;
use intent::{IntentParser, VisibleCatalog};
use locks::TurnLocks;
use npc::NpcReactor;
use synthesis::{DrivingEvent, NarrativeSynthesizer};
use trigger::{TriggerDecision, TriggerEvaluator};

/// World-state key holding the scenario's opening narration, played as the
/// keeper's first line when a character has no history yet.
pub const OPENING_NARRATION_KEY: &str = "opening_narration";

/// Errors that abort a turn. Everything here maps onto an HTTP status in
/// the API layer; recovered conditions (parse failures, refused moves)
/// never surface as errors.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// A turn for this character is already running; the client may retry.
    #[error("a turn is already in flight for this character")]
    TurnInFlight,

    /// A read the turn cannot proceed without came back empty.
    #[error("{entity_type} not found: {id}")]
    EntityMissing {
        entity_type: &'static str,
        id: String,
    },

    /// KV backend down.
    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    /// Relational catalog failure.
    #[error("catalog failure: {0}")]
    Catalog(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TurnError {
    pub fn entity_missing(entity_type: &'static str, id: impl ToString) -> Self {
        Self::EntityMissing {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<StoreError> for TurnError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EntityMissing { entity_type, id } => {
                Self::EntityMissing { entity_type, id }
            }
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            StoreError::Serialization(message) => Self::Internal(message),
        }
    }
}

impl From<CatalogError> for TurnError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err.to_string())
    }
}

/// What one committed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub conversation_history: Vec<ConversationEntry>,
    pub state_refreshed: bool,
}

/// The orchestrator service. One instance serves every character; the
/// per-character lock serializes turns.
pub struct TurnService {
    stores: Stores,
    catalog: Arc<dyn CatalogPort>,
    dice: Arc<dyn DiceSinkPort>,
    locks: TurnLocks,
    intent_parser: IntentParser,
    trigger_evaluator: TriggerEvaluator,
    check_resolver: CheckResolver,
    npc_reactor: NpcReactor,
    synthesizer: NarrativeSynthesizer,
}

impl TurnService {
    pub fn new(
        stores: Stores,
        catalog: Arc<dyn CatalogPort>,
        oracle: Arc<dyn OraclePort>,
        memory: Arc<dyn MemoryPort>,
        dice: Arc<dyn DiceSinkPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            stores,
            catalog,
            dice: dice.clone(),
            locks: TurnLocks::new(),
            intent_parser: IntentParser::new(oracle.clone()),
            trigger_evaluator: TriggerEvaluator::new(oracle.clone()),
            check_resolver: CheckResolver::new(dice, random.clone()),
            npc_reactor: NpcReactor::new(oracle.clone(), memory, random.clone()),
            synthesizer: NarrativeSynthesizer::new(oracle, random),
        }
    }

    /// Run one player turn end to end.
    #[tracing::instrument(skip(self, input), fields(player = %player_id))]
    pub async fn run_turn(
        &self,
        player_id: &CharacterId,
        input: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let _guard = self
            .locks
            .acquire(player_id)
            .ok_or(TurnError::TurnInFlight)?;

        // ---- Snapshot at turn start -------------------------------------
        let catalog = self.catalog.as_ref();
        // The fallback map only matters before the player session exists.
        let mut writes = TurnWrites::new(player_id.clone(), MapId::new(1));

        let player_sheet = writes
            .sheet(&self.stores, catalog, player_id)
            .await?
            .ok_or_else(|| TurnError::entity_missing("CharacterSheet", player_id))?;

        if !writes.ensure_session(&self.stores, catalog, player_id).await? {
            return Err(TurnError::entity_missing("SessionState", player_id));
        }
        let player_session = writes
            .sessions
            .get(player_id)
            .cloned()
            .ok_or_else(|| TurnError::internal("player session vanished"))?;
        let map_id = player_session.current_map_id;

        let map_state = writes
            .map_mut(&self.stores, catalog, map_id)
            .await?
            .clone();
        let completed = self.stores.completed_events(player_id).await?;
        let mut history = self.stores.conversation_history(player_id).await?;
        if history.is_empty() {
            if let Some(opening) = self
                .stores
                .world_state()
                .await?
                .get(OPENING_NARRATION_KEY)
                .and_then(|value| value.as_str())
            {
                history.push(ConversationEntry::keeper(opening));
            }
        }

        // ---- Stage: intent parsing --------------------------------------
        let visible = self
            .visible_catalog(&mut writes, &map_state, map_id)
            .await?;
        let action = self.intent_parser.parse(input, &visible).await;

        // ---- Stage: trigger evaluation / pending check --------------------
        let decision = self
            .trigger_evaluator
            .decide(
                &self.stores,
                catalog,
                &mut writes,
                &player_session,
                &action,
                &completed,
                map_id,
            )
            .await?;

        let mut driving: Option<DrivingEvent> = None;
        let mut ad_hoc_checks: Vec<SkillCheckOutcome> = Vec::new();

        match decision {
            TriggerDecision::ResolveFirst(event) => {
                let success = self.resolve_pending(&mut writes, &player_sheet, &event).await?;
                self.set_pending(&mut writes, player_id, None);
                driving = Some(DrivingEvent {
                    event,
                    check_success: Some(success),
                });
            }
            TriggerDecision::Suspend(event) => {
                // Suspense latch: announce the check, persist the marker,
                // end the turn before any reactor runs.
                self.set_pending(&mut writes, player_id, Some(event.event_id));
                let narrative = event
                    .effects
                    .suspense_narrative()
                    .unwrap_or(&event.event_info)
                    .to_string();
                history.push(ConversationEntry::player(input));
                history.push(ConversationEntry::keeper(narrative.clone()));
                writes.history = Some(history);
                return self.commit(writes, narrative).await;
            }
            TriggerDecision::Fire(event) => {
                driving = Some(DrivingEvent {
                    event,
                    check_success: None,
                });
            }
            TriggerDecision::None => {
                // Ad-hoc checks for deliberate skill use outside any event.
                if let (Intent::UseSkill, Some(requests)) =
                    (action.intent, &action.skill_check_request)
                {
                    for name in requests {
                        match AttributeKey::from_name(name) {
                            Some(key) => ad_hoc_checks.push(self.check_resolver.resolve(
                                &player_sheet,
                                key,
                                Difficulty::Normal,
                            )),
                            None => tracing::warn!(skill = %name, "Unknown ad-hoc skill name"),
                        }
                    }
                }
            }
        }

        // ---- Stage: NPC reactor fan-out ---------------------------------
        let seed_context = match &driving {
            Some(driving) => format!(
                "玩家行动：{input}\n{}",
                synthesis_base_text(driving)
            ),
            None => format!("玩家行动：{input}"),
        };
        let reactions = self
            .npc_reactor
            .run(&self.stores, catalog, &mut writes, &map_state.npcs, &seed_context)
            .await?;

        // ---- Stage: synthesis -------------------------------------------
        let reply = self
            .synthesizer
            .synthesize(
                &self.stores,
                catalog,
                &mut writes,
                &player_sheet,
                input,
                &action,
                driving.as_ref(),
                &ad_hoc_checks,
                &reactions,
                history,
                completed,
            )
            .await?;

        self.commit(writes, reply).await
    }

    /// Roll the gating check of a pending event and return the verdict.
    async fn resolve_pending(
        &self,
        writes: &mut TurnWrites,
        player_sheet: &CharacterSheet,
        event: &KeeperEvent,
    ) -> Result<bool, TurnError> {
        let Some(spec) = event.check_gate() else {
            tracing::warn!(event_id = %event.event_id, "Pending event carries no check, treating as success");
            return Ok(true);
        };
        let key = match spec.skill_id.key() {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(%err, "Pending check uses an unknown skill id");
                return Ok(false);
            }
        };
        // The check usually targets the player; an explicit character_id
        // pins it to someone else.
        let sheet = match &spec.character_id {
            Some(target) => {
                match writes.sheet(&self.stores, self.catalog.as_ref(), target).await? {
                    Some(sheet) => sheet,
                    None => {
                        tracing::warn!(%target, "Check target has no sheet, rolling for the player");
                        player_sheet.clone()
                    }
                }
            }
            None => player_sheet.clone(),
        };
        Ok(self.check_resolver.resolve(&sheet, key, spec.difficulty).success)
    }

    fn set_pending(
        &self,
        writes: &mut TurnWrites,
        player_id: &CharacterId,
        pending: Option<EventId>,
    ) {
        if let Some(session) = writes.sessions.get_mut(player_id) {
            session.pending_check_event_id = pending;
            writes.player_state_touched = true;
        }
    }

    /// Names for everything the intent parser may ground a target on.
    async fn visible_catalog(
        &self,
        writes: &mut TurnWrites,
        map_state: &MapState,
        map_id: MapId,
    ) -> Result<VisibleCatalog, TurnError> {
        let catalog = self.catalog.as_ref();
        let mut visible = VisibleCatalog::default();
        for npc_id in &map_state.npcs {
            let name = writes
                .sheet(&self.stores, catalog, npc_id)
                .await?
                .map(|sheet| sheet.info.name)
                .unwrap_or_else(|| npc_id.to_string());
            visible.npcs.push((npc_id.to_string(), name));
        }
        for object in catalog.objects_on_map(map_id).await? {
            visible
                .objects
                .push((object.object_id.to_string(), object.name));
        }
        for target in &map_state.accessible_maps {
            let name = catalog
                .map_info(*target)
                .await?
                .map(|info| info.name)
                .unwrap_or_else(|| format!("地图{target}"));
            visible.locations.push((target.value(), name));
        }
        Ok(visible)
    }

    /// Flush the write buffer, then notify the dice channel.
    async fn commit(&self, writes: TurnWrites, reply: String) -> Result<TurnOutcome, TurnError> {
        let player_id = writes.player_id().clone();
        let state_refreshed = writes.player_state_touched;
        let conversation_history = writes.history.clone().unwrap_or_default();
        writes.commit(&self.stores).await?;
        if state_refreshed {
            self.dice.push(ServerMessage::CharacterStateRefresh {
                character_id: player_id.to_string(),
                timestamp: chrono::Utc::now().timestamp(),
            });
        }
        Ok(TurnOutcome {
            reply,
            conversation_history,
            state_refreshed,
        })
    }
}

/// Baseline event text fed to the reactor loop before synthesis runs.
fn synthesis_base_text(driving: &DrivingEvent) -> String {
    let event = &driving.event;
    match driving.check_success {
        Some(true) | None => event
            .effects
            .outcome_for(true)
            .and_then(|block| block.narrative.clone())
            .unwrap_or_else(|| {
                if event.success_result_info.is_empty() {
                    event.event_info.clone()
                } else {
                    event.success_result_info.clone()
                }
            }),
        Some(false) => event
            .effects
            .outcome_for(false)
            .and_then(|block| block.narrative.clone())
            .unwrap_or_else(|| {
                if event.fail_result_info.is_empty() {
                    event.event_info.clone()
                } else {
                    event.fail_result_info.clone()
                }
            }),
    }
}
