//! Skill check resolution.

use std::sync::Arc;

use keeper_domain::{AttributeKey, CharacterSheet, Difficulty, SkillCheckOutcome};
use keeper_shared::ServerMessage;

use crate::infrastructure::ports::{DiceSinkPort, RandomPort};

/// Rolls checks and streams every result to the dice channel.
pub struct CheckResolver {
    dice: Arc<dyn DiceSinkPort>,
    random: Arc<dyn RandomPort>,
}

impl CheckResolver {
    pub fn new(dice: Arc<dyn DiceSinkPort>, random: Arc<dyn RandomPort>) -> Self {
        Self { dice, random }
    }

    /// Roll 1d100 against the sheet's value at the given difficulty.
    ///
    /// The result frame is pushed to the dice sink before returning, so the
    /// client sees the roll even when the narrative lags behind.
    pub fn resolve(
        &self,
        sheet: &CharacterSheet,
        key: AttributeKey,
        difficulty: Difficulty,
    ) -> SkillCheckOutcome {
        let skill_value = sheet.value_of(key);
        let roll = self.random.d100();
        let outcome = SkillCheckOutcome::judge(key, skill_value, difficulty, roll);
        tracing::info!(
            character = %sheet.info.id,
            skill = outcome.skill_name,
            roll = outcome.roll,
            threshold = outcome.threshold,
            success = outcome.success,
            "Resolved skill check"
        );
        self.dice.push(ServerMessage::SkillCheckResult {
            skill_name: outcome.skill_name.clone(),
            dice_roll: outcome.roll,
            threshold: outcome.threshold,
            success: outcome.success,
            hard_level: outcome.difficulty.level(),
        });
        outcome
    }
}
