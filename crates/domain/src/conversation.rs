//! Conversation history entries.

use serde::{Deserialize, Serialize};

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Keeper,
}

/// One line of the per-character conversation log. Every committed turn
/// appends exactly one player entry and one keeper entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
}

impl ConversationEntry {
    pub fn player(content: impl Into<String>) -> Self {
        Self {
            role: Role::Player,
            content: content.into(),
        }
    }

    pub fn keeper(content: impl Into<String>) -> Self {
        Self {
            role: Role::Keeper,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_round_trip_with_snake_case_roles() {
        let entry = ConversationEntry::keeper("The rain does not let up.");
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains(r#""role":"keeper""#));
        let back: ConversationEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, entry);
    }
}
