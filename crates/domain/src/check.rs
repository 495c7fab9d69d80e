//! d100 check math: the difficulty ladder and the perception formula.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::attributes::AttributeKey;

/// Difficulty ladder for skill checks, encoded 1..3 in catalog rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    #[default]
    Normal,
    Hard,
    Extreme,
}

impl Difficulty {
    pub fn from_level(level: i64) -> Self {
        match level {
            2 => Self::Hard,
            3 => Self::Extreme,
            _ => Self::Normal,
        }
    }

    pub fn level(self) -> i64 {
        match self {
            Self::Normal => 1,
            Self::Hard => 2,
            Self::Extreme => 3,
        }
    }
}

impl Serialize for Difficulty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.level())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let level = i64::deserialize(deserializer)?;
        Ok(Self::from_level(level))
    }
}

/// Success threshold for a skill value at a difficulty.
///
/// Normal uses the full value, hard the half, extreme the fifth. Integer
/// division floors, so skill 0 yields threshold 0 and can never pass.
pub fn threshold_for(skill_value: i64, difficulty: Difficulty) -> i64 {
    match difficulty {
        Difficulty::Normal => skill_value,
        Difficulty::Hard => skill_value / 2,
        Difficulty::Extreme => skill_value / 5,
    }
}

/// Result of one resolved skill check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCheckOutcome {
    pub skill_name: String,
    pub skill_value: i64,
    pub difficulty: Difficulty,
    pub threshold: i64,
    pub roll: i64,
    pub success: bool,
}

impl SkillCheckOutcome {
    /// Judge a d100 roll against a skill value. Success iff roll ≤ threshold.
    pub fn judge(key: AttributeKey, skill_value: i64, difficulty: Difficulty, roll: i64) -> Self {
        let threshold = threshold_for(skill_value, difficulty);
        Self {
            skill_name: key.name().to_string(),
            skill_value,
            difficulty,
            threshold,
            roll,
            success: roll <= threshold,
        }
    }
}

/// Perception arbitration for private actions.
///
/// The observer rolls 1d100 and notices the actor iff the roll lands under
/// its investigate value but above half the actor's stealth. The formula is
/// kept literally from the scenario rules.
pub fn perception_notices(roll: i64, observer_investigate: i64, actor_stealth: i64) -> bool {
    roll <= observer_investigate && roll > actor_stealth / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_ladder_is_full_half_fifth() {
        assert_eq!(threshold_for(60, Difficulty::Normal), 60);
        assert_eq!(threshold_for(60, Difficulty::Hard), 30);
        assert_eq!(threshold_for(60, Difficulty::Extreme), 12);
        // floor division
        assert_eq!(threshold_for(45, Difficulty::Hard), 22);
        assert_eq!(threshold_for(49, Difficulty::Extreme), 9);
    }

    #[test]
    fn success_iff_roll_at_or_under_threshold() {
        let outcome = SkillCheckOutcome::judge(AttributeKey::Drive, 60, Difficulty::Hard, 30);
        assert!(outcome.success);
        let outcome = SkillCheckOutcome::judge(AttributeKey::Drive, 60, Difficulty::Hard, 31);
        assert!(!outcome.success);
    }

    #[test]
    fn zero_skill_at_extreme_always_fails() {
        let outcome = SkillCheckOutcome::judge(AttributeKey::Occult, 0, Difficulty::Extreme, 1);
        assert_eq!(outcome.threshold, 0);
        assert!(!outcome.success);
    }

    #[test]
    fn difficulty_serializes_as_its_level() {
        let json = serde_json::to_string(&Difficulty::Extreme).expect("serialize");
        assert_eq!(json, "3");
        let back: Difficulty = serde_json::from_str("2").expect("deserialize");
        assert_eq!(back, Difficulty::Hard);
    }

    #[test]
    fn perception_window_is_between_half_stealth_and_investigate() {
        // observer investigate 70, actor stealth 80 -> window (40, 70]
        assert!(perception_notices(40 + 1, 70, 80));
        assert!(perception_notices(70, 70, 80));
        assert!(!perception_notices(40, 70, 80));
        assert!(!perception_notices(71, 70, 80));
        // player with investigate 20 misses on 50
        assert!(!perception_notices(50, 20, 80));
    }
}
