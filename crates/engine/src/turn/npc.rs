//! The NPC reactor loop.
//!
//! Runs only when the turn did not suspend. Actors react strictly in order
//! (dexterity descending, ties by id) so that later NPCs can see earlier
//! public reactions, and private reactions stay hidden behind perception
//! rolls.

use std::sync::Arc;

use serde::Deserialize;

use keeper_domain::{perception_notices, AttributeKey, CharacterId, CharacterSheet};

use crate::infrastructure::ports::{
    CatalogPort, MemoryPort, OraclePort, OracleRequest, RandomPort,
};
use crate::stores::{Stores, TurnWrites};
use crate::turn::TurnError;

/// Who can see a reaction without a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// One NPC's reaction this turn.
#[derive(Debug, Clone)]
pub struct NpcReaction {
    pub npc_id: CharacterId,
    pub name: String,
    pub visibility: Visibility,
    pub dialogue: String,
    pub action: String,
    /// Actor stealth at reaction time, for later perception rolls.
    pub stealth: i64,
}

/// Strict JSON contract for the reaction oracle.
#[derive(Debug, Deserialize)]
struct ReactionReply {
    visibility: Visibility,
    #[serde(default)]
    dialogue: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    new_status: Option<String>,
    #[serde(default)]
    new_goal: Option<String>,
}

/// The hint injected for a noticed private action.
pub fn obfuscated_notice(name: &str, action: &str) -> String {
    format!("[你注意到{name}似乎在{action}]")
}

pub struct NpcReactor {
    oracle: Arc<dyn OraclePort>,
    memory: Arc<dyn MemoryPort>,
    random: Arc<dyn RandomPort>,
}

impl NpcReactor {
    pub fn new(
        oracle: Arc<dyn OraclePort>,
        memory: Arc<dyn MemoryPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            oracle,
            memory,
            random,
        }
    }

    /// Drive every NPC on the map through one reaction step.
    ///
    /// `seed_context` is the turn's baseline narrative summary (player
    /// action plus any event outcome text); public reactions accumulate
    /// onto it in loop order.
    #[tracing::instrument(skip_all, fields(actors = npc_ids.len()))]
    pub async fn run(
        &self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        writes: &mut TurnWrites,
        npc_ids: &[CharacterId],
        seed_context: &str,
    ) -> Result<Vec<NpcReaction>, TurnError> {
        let mut actors = Vec::with_capacity(npc_ids.len());
        for id in npc_ids {
            match writes.sheet(stores, catalog, id).await? {
                Some(sheet) => actors.push(sheet),
                None => tracing::warn!(npc = %id, "NPC on map has no character sheet"),
            }
        }
        // Dexterity descending, ties by id lexicographic.
        actors.sort_by(|a, b| {
            b.attributes
                .dexterity
                .cmp(&a.attributes.dexterity)
                .then_with(|| a.info.id.cmp(&b.info.id))
        });

        let mut public_context = seed_context.to_string();
        let mut private_actions: Vec<NpcReaction> = Vec::new();
        let mut reactions = Vec::new();

        for sheet in actors {
            let npc_id = sheet.info.id.clone();
            writes.ensure_session(stores, catalog, &npc_id).await?;

            let overlay = self.perception_overlay(&sheet, &private_actions);
            let recall = match self.memory.recall(&npc_id).await {
                Ok(snippets) => snippets,
                Err(err) => {
                    tracing::warn!(npc = %npc_id, %err, "Memory recall failed, using empty");
                    Default::default()
                }
            };

            let request = OracleRequest::new(
                REACTION_PROMPT,
                reaction_context(&sheet, &public_context, &overlay, &recall.short_term, &recall.long_term),
            )
            .with_temperature(0.6);

            let reply = match self.oracle.generate(request).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(npc = %npc_id, %err, "Reaction oracle failed, skipping NPC");
                    continue;
                }
            };
            let reply: ReactionReply = match serde_json::from_value(reply) {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(npc = %npc_id, %err, "Reaction reply malformed, skipping NPC");
                    continue;
                }
            };

            self.persist_npc_state(catalog, writes, &sheet, &reply).await;

            let reaction = NpcReaction {
                npc_id: npc_id.clone(),
                name: sheet.info.name.clone(),
                visibility: reply.visibility,
                dialogue: reply.dialogue,
                action: reply.action,
                stealth: sheet.value_of(AttributeKey::Stealth),
            };

            let observation = format!(
                "{}：{} {}",
                reaction.name, reaction.dialogue, reaction.action
            );
            if let Err(err) = self.memory.record(&npc_id, &observation).await {
                tracing::warn!(npc = %npc_id, %err, "Memory write failed");
            }

            match reaction.visibility {
                Visibility::Public => {
                    public_context.push('\n');
                    public_context.push_str(&observation);
                }
                Visibility::Private => private_actions.push(reaction.clone()),
            }
            reactions.push(reaction);
        }

        Ok(reactions)
    }

    /// Roll perception for every still-hidden private action of this turn.
    fn perception_overlay(
        &self,
        observer: &CharacterSheet,
        private_actions: &[NpcReaction],
    ) -> Vec<String> {
        let investigate = observer.value_of(AttributeKey::Investigate);
        private_actions
            .iter()
            .filter_map(|prior| {
                let roll = self.random.d100();
                let noticed = perception_notices(roll, investigate, prior.stealth);
                tracing::debug!(
                    observer = %observer.info.id,
                    actor = %prior.npc_id,
                    roll,
                    investigate,
                    stealth = prior.stealth,
                    noticed,
                    "Perception roll"
                );
                noticed.then(|| obfuscated_notice(&prior.name, &prior.action))
            })
            .collect()
    }

    /// Write the oracle's status/goal back to the sheet and the catalog.
    async fn persist_npc_state(
        &self,
        catalog: &dyn CatalogPort,
        writes: &mut TurnWrites,
        sheet: &CharacterSheet,
        reply: &ReactionReply,
    ) {
        if reply.new_status.is_none() && reply.new_goal.is_none() {
            return;
        }
        let mut updated = sheet.clone();
        if let Some(status) = &reply.new_status {
            updated.info.status = status.clone();
        }
        if let Some(goal) = &reply.new_goal {
            updated.info.current_goal = goal.clone();
        }
        if let Err(err) = catalog
            .update_npc_state(&updated.info.id, &updated.info.status, &updated.info.current_goal)
            .await
        {
            tracing::warn!(npc = %updated.info.id, %err, "NPC state write-through failed");
        }
        writes.sheets.insert(updated.info.id.clone(), updated);
    }
}

fn reaction_context(
    sheet: &CharacterSheet,
    public_context: &str,
    overlay: &[String],
    short_term: &str,
    long_term: &str,
) -> String {
    let mut context = format!(
        "You are {name} ({profession}). Current status: {status}. Current goal: {goal}.\n\
         What everyone at the scene has seen so far:\n{public_context}\n",
        name = sheet.info.name,
        profession = sheet.info.profession,
        status = sheet.info.status,
        goal = sheet.info.current_goal,
    );
    if !overlay.is_empty() {
        context.push_str("Things only you noticed:\n");
        for hint in overlay {
            context.push_str(hint);
            context.push('\n');
        }
    }
    if !short_term.is_empty() || !long_term.is_empty() {
        context.push_str(&format!(
            "Your memory:\nrecent: {short_term}\nolder: {long_term}\n"
        ));
    }
    context
}

const REACTION_PROMPT: &str = r#"You play one NPC in a Call of Cthulhu session.
React to the scene in character, in one short beat. Choose "private" visibility
only for something you deliberately hide from the others. Reply with strict JSON:
{"visibility": "public"|"private", "dialogue": "...", "action": "...", "new_status": "...", "new_goal": "..."}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_reply_requires_visibility() {
        let err = serde_json::from_value::<ReactionReply>(serde_json::json!({
            "dialogue": "hello"
        }));
        assert!(err.is_err());
        let ok: ReactionReply = serde_json::from_value(serde_json::json!({
            "visibility": "private", "action": "slips a hand into the coat"
        }))
        .expect("reply");
        assert_eq!(ok.visibility, Visibility::Private);
        assert!(ok.dialogue.is_empty());
    }

    #[test]
    fn notice_hint_is_obfuscated() {
        let hint = obfuscated_notice("湿透的女人", "摸向口袋");
        assert_eq!(hint, "[你注意到湿透的女人似乎在摸向口袋]");
    }
}
