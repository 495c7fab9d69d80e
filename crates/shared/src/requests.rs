//! REST request bodies.

use serde::{Deserialize, Serialize};

/// `POST /api/character_entered`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterEnteredRequest {
    pub character_id: String,
}

/// `POST /api/chat` - one player turn. The acting character comes from the
/// ambient session context, not the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub input: String,
}
