//! Narrative synthesis and state-delta application.
//!
//! The synthesizer owns the tail of the turn: apply the driving event's
//! outcome block, validate movement, fold NPC reactions into the final
//! narrative, record unique-event completion and append the conversation
//! pair. All mutations land in the turn's write buffer; the driver commits.

use std::sync::Arc;

use keeper_domain::{
    perception_notices, AttributeKey, CharacterSheet, ConversationEntry, EventId, Intent,
    KeeperEvent, OutcomeBlock, PlayerAction, SkillCheckOutcome,
};

use crate::infrastructure::ports::{CatalogPort, OraclePort, OracleRequest, RandomPort};
use crate::stores::{Stores, TurnWrites};
use crate::turn::npc::{obfuscated_notice, NpcReaction, Visibility};
use crate::turn::TurnError;

/// Non-empty reply of last resort when every oracle degraded.
pub const DEFAULT_SCENE_NARRATIVE: &str =
    "四周只有连绵的雨声。夜色深沉，没有什么回应你的动作。";

/// The event driving this turn's narrative, with its check verdict when one
/// was just resolved.
#[derive(Debug, Clone)]
pub struct DrivingEvent {
    pub event: KeeperEvent,
    /// None: the event fired without a check. Some: the resolver's verdict.
    pub check_success: Option<bool>,
}

impl DrivingEvent {
    fn succeeded(&self) -> bool {
        self.check_success.unwrap_or(true)
    }
}

pub struct NarrativeSynthesizer {
    oracle: Arc<dyn OraclePort>,
    random: Arc<dyn RandomPort>,
}

impl NarrativeSynthesizer {
    pub fn new(oracle: Arc<dyn OraclePort>, random: Arc<dyn RandomPort>) -> Self {
        Self { oracle, random }
    }

    /// Produce the keeper reply and buffer every state delta of the turn.
    #[tracing::instrument(skip_all)]
    pub async fn synthesize(
        &self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        writes: &mut TurnWrites,
        player_sheet: &CharacterSheet,
        input: &str,
        action: &PlayerAction,
        driving: Option<&DrivingEvent>,
        ad_hoc_checks: &[SkillCheckOutcome],
        reactions: &[NpcReaction],
        history: Vec<ConversationEntry>,
        completed: Vec<EventId>,
    ) -> Result<String, TurnError> {
        let mut narrative = match driving {
            Some(driving) => {
                self.apply_event(stores, catalog, writes, driving).await?
            }
            None => self.fallback_narrative(input, &history, ad_hoc_checks).await,
        };

        if action.intent == Intent::Move {
            let line = self
                .resolve_move(stores, catalog, writes, action)
                .await?;
            narrative.push('\n');
            narrative.push_str(&line);
        }

        self.fold_reactions(player_sheet, reactions, &mut narrative);

        // Unique events complete exactly once per character.
        if let Some(driving) = driving {
            let event = &driving.event;
            if event.if_unique && !completed.contains(&event.event_id) {
                let mut updated = completed;
                updated.push(event.event_id);
                writes.completed = Some(updated);
            }
        }

        if narrative.trim().is_empty() {
            narrative = DEFAULT_SCENE_NARRATIVE.to_string();
        }

        let mut updated_history = history;
        updated_history.push(ConversationEntry::player(input));
        updated_history.push(ConversationEntry::keeper(narrative.clone()));
        writes.history = Some(updated_history);

        Ok(narrative)
    }

    /// Apply one branch of the driving event and return its base narrative.
    async fn apply_event(
        &self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        writes: &mut TurnWrites,
        driving: &DrivingEvent,
    ) -> Result<String, TurnError> {
        let event = &driving.event;
        let success = driving.succeeded();
        let branch_info = if success {
            &event.success_result_info
        } else {
            &event.fail_result_info
        };

        let block = event.effects.outcome_for(success).cloned().unwrap_or_default();

        let mut narrative = block
            .narrative
            .clone()
            .or_else(|| (!branch_info.is_empty()).then(|| branch_info.clone()))
            .unwrap_or_else(|| event.event_info.clone());
        if let Some(injection) = &block.narrative_injection {
            narrative.push('\n');
            narrative.push_str(injection);
        }

        self.apply_block(stores, catalog, writes, event, &block).await?;

        tracing::info!(
            event_id = %event.event_id,
            success,
            "Applied event outcome"
        );
        Ok(narrative)
    }

    async fn apply_block(
        &self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        writes: &mut TurnWrites,
        event: &KeeperEvent,
        block: &OutcomeBlock,
    ) -> Result<(), TurnError> {
        writes
            .apply_state_changes(stores, catalog, &block.state_changes)
            .await?;

        for change in &block.npc_state_change {
            if let Some(sheet) = writes.sheet(stores, catalog, &change.character_id).await? {
                let mut updated = sheet;
                updated.info.status = change.new_status.clone();
                if let Err(err) = catalog
                    .update_npc_state(
                        &change.character_id,
                        &updated.info.status,
                        &updated.info.current_goal,
                    )
                    .await
                {
                    tracing::warn!(npc = %change.character_id, %err, "NPC status write-through failed");
                }
                writes.sheets.insert(change.character_id.clone(), updated);
            } else {
                tracing::warn!(npc = %change.character_id, "npc_state_change target has no sheet");
            }
        }

        writes
            .merge_world_state(stores, &block.world_state_change)
            .await?;

        if let Some(map_change) = &block.map_state_change {
            writes
                .apply_map_state_changes(stores, catalog, map_change)
                .await?;
        }

        writes
            .apply_object_state_changes(stores, catalog, event.map_id, &block.object_state_change)
            .await?;

        Ok(())
    }

    /// Validate a move intent and perform it when the edge exists.
    async fn resolve_move(
        &self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        writes: &mut TurnWrites,
        action: &PlayerAction,
    ) -> Result<String, TurnError> {
        let player_id = writes.player_id().clone();
        if !writes.ensure_session(stores, catalog, &player_id).await? {
            return Err(TurnError::entity_missing("SessionState", &player_id));
        }
        let current_map = writes
            .sessions
            .get(&player_id)
            .map(|session| session.current_map_id)
            .ok_or_else(|| TurnError::internal("player session vanished"))?;

        let Some(target) = action.target_location_id else {
            tracing::debug!("Move intent without a target map");
            return Ok("你想动身，却说不清要去哪里。".to_string());
        };

        let accessible = writes
            .map_mut(stores, catalog, current_map)
            .await?
            .is_accessible(target);
        if !accessible {
            tracing::info!(%current_map, %target, "Move rejected: no accessibility edge");
            return Ok("你试图前往的方向此刻无法通行。".to_string());
        }

        if let Some(session) = writes.sessions.get_mut(&player_id) {
            session.current_map_id = target;
        }
        writes.player_state_touched = true;

        let vehicle = writes
            .sessions
            .get(&player_id)
            .and_then(|session| session.current_vehicle_id);
        if let Err(err) = catalog
            .update_character_location(&player_id, target, vehicle)
            .await
        {
            tracing::warn!(%err, "Player location write-through failed");
        }

        // Load the destination and bootstrap its NPC sessions.
        let npcs = writes.map_mut(stores, catalog, target).await?.npcs.clone();
        for npc_id in &npcs {
            writes.ensure_session(stores, catalog, npc_id).await?;
        }

        let from = catalog.map_info(current_map).await?;
        let to = catalog.map_info(target).await?;
        tracing::info!(%current_map, %target, "Player moved");
        Ok(match (from, to) {
            (Some(from), Some(to)) => {
                format!("你从{}来到了{}。{}", from.name, to.name, to.info)
            }
            _ => format!("你来到了地图{target}。"),
        })
    }

    /// Append public reactions in loop order; gate private ones behind the
    /// player's perception.
    fn fold_reactions(
        &self,
        player_sheet: &CharacterSheet,
        reactions: &[NpcReaction],
        narrative: &mut String,
    ) {
        let investigate = player_sheet.value_of(AttributeKey::Investigate);
        for reaction in reactions {
            match reaction.visibility {
                Visibility::Public => {
                    narrative.push('\n');
                    if reaction.dialogue.is_empty() {
                        narrative.push_str(&format!("{}{}", reaction.name, reaction.action));
                    } else {
                        narrative.push_str(&format!(
                            "{}：“{}”{}",
                            reaction.name, reaction.dialogue, reaction.action
                        ));
                    }
                }
                Visibility::Private => {
                    let roll = self.random.d100();
                    if perception_notices(roll, investigate, reaction.stealth) {
                        narrative.push('\n');
                        narrative.push_str(&obfuscated_notice(&reaction.name, &reaction.action));
                    } else {
                        tracing::debug!(
                            actor = %reaction.npc_id,
                            roll,
                            investigate,
                            "Player missed a private action"
                        );
                    }
                }
            }
        }
    }

    /// Scene description for turns with no driving event.
    async fn fallback_narrative(
        &self,
        input: &str,
        history: &[ConversationEntry],
        ad_hoc_checks: &[SkillCheckOutcome],
    ) -> String {
        let recent: Vec<String> = history
            .iter()
            .rev()
            .take(6)
            .rev()
            .map(|entry| format!("{:?}: {}", entry.role, entry.content))
            .collect();
        let checks: Vec<String> = ad_hoc_checks
            .iter()
            .map(|check| {
                format!(
                    "{}: {}/{} {}",
                    check.skill_name,
                    check.roll,
                    check.threshold,
                    if check.success { "成功" } else { "失败" }
                )
            })
            .collect();
        let user_prompt = format!(
            "Player input: {input}\nRecent conversation:\n{}\nCheck results this turn:\n{}",
            recent.join("\n"),
            if checks.is_empty() {
                "none".to_string()
            } else {
                checks.join("\n")
            }
        );

        let request =
            OracleRequest::new(SCENE_PROMPT, user_prompt).with_temperature(0.7);
        match self.oracle.generate(request).await {
            Ok(reply) => reply
                .get("narrative")
                .and_then(|v| v.as_str())
                .filter(|text| !text.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_SCENE_NARRATIVE.to_string()),
            Err(err) => {
                tracing::warn!(%err, "Scene oracle failed, using default narrative");
                DEFAULT_SCENE_NARRATIVE.to_string()
            }
        }
    }
}

const SCENE_PROMPT: &str = r#"You are the Keeper of a Call of Cthulhu session.
Continue the scene in 2-4 atmospheric sentences, strictly from the player's
perspective, without inventing entities the conversation has not introduced,
and reflect any check results as immediate sensations. Reply with strict JSON:
{"narrative": "..."}"#;
