//! WebSocket push frames for the dice channel.
//!
//! The engine is the only producer. Frames are tagged with a `type` field;
//! new variants may be added at the end, renames are breaking.

use serde::{Deserialize, Serialize};

/// Messages pushed from the engine to dice-channel subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A skill check was resolved somewhere in the pipeline.
    SkillCheckResult {
        skill_name: String,
        dice_roll: i64,
        threshold: i64,
        success: bool,
        hard_level: i64,
    },
    /// The synthesizer applied a state delta to this character; clients
    /// should refetch `/api/character_data`.
    CharacterStateRefresh {
        character_id: String,
        timestamp: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged_with_snake_case_type() {
        let frame = ServerMessage::SkillCheckResult {
            skill_name: "drive".to_string(),
            dice_roll: 20,
            threshold: 30,
            success: true,
            hard_level: 2,
        };
        let json = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(json["type"], "skill_check_result");
        assert_eq!(json["dice_roll"], 20);
    }

    #[test]
    fn refresh_frame_round_trips() {
        let frame = ServerMessage::CharacterStateRefresh {
            character_id: "investigator_01".to_string(),
            timestamp: 1_700_000_000,
        };
        let json = serde_json::to_string(&frame).expect("serialize");
        let back: ServerMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, frame);
    }
}
