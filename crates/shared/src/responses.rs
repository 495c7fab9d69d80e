//! REST response bodies.

use serde::{Deserialize, Serialize};

/// `POST /api/chat` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<serde_json::Value>>,
}

/// `POST /api/character_entered` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterEnteredResponse {
    pub status: String,
    pub npcs_loaded: usize,
    pub objects_loaded: usize,
}

/// Live status block inside `/api/character_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterStatusView {
    pub hit_points: i64,
    pub magic_points: i64,
    pub sanity: i64,
    pub current_map_id: i64,
    #[serde(default)]
    pub current_vehicle_id: Option<i64>,
}

/// `GET /api/character_data` - combined static sheet + live status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterDataResponse {
    pub info: serde_json::Value,
    pub attributes: serde_json::Value,
    pub derived_attributes: serde_json::Value,
    pub skills: serde_json::Value,
    pub backgrounds: serde_json::Value,
    pub status: CharacterStatusView,
}

/// KV backend connectivity as reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreHealth {
    Connected,
    Disconnected,
}

/// `GET /health` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub redis: StoreHealth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_reports_lowercase_store_state() {
        let body = HealthResponse {
            status: "ok".to_string(),
            redis: StoreHealth::Disconnected,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["redis"], "disconnected");
    }
}
