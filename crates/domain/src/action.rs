//! Parsed player actions.
//!
//! The intent parser normalizes free text into this closed vocabulary; it
//! must never invent an intent outside the enum. The three scenario hooks
//! (`help_woman`, `leave_woman`, `take_amelia_in_car`) exist because event
//! preconditions reference them.

use serde::{Deserialize, Serialize};

use crate::ids::MapId;

/// Closed intent vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Inspect,
    Talk,
    Take,
    Use,
    UseSkill,
    Move,
    HelpWoman,
    LeaveWoman,
    TakeAmeliaInCar,
    /// Anything the parser could not place in the vocabulary.
    #[serde(other)]
    Unknown,
}

/// Structured result of parsing one player input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_location_id: Option<MapId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_check_request: Option<Vec<String>>,
    /// Original input, kept when parsing degraded to `unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl PlayerAction {
    /// The degraded result for unparseable input or an expired oracle.
    pub fn unknown(raw_text: impl Into<String>) -> Self {
        Self {
            intent: Intent::Unknown,
            target: None,
            topic: None,
            target_location_id: None,
            skill_check_request: None,
            raw_text: Some(raw_text.into()),
        }
    }
}
