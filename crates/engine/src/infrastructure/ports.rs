// Port traits define the full contract - some methods are for future use
#![allow(dead_code)]

//! Port traits for every external dependency of the turn pipeline.
//!
//! Adapters live next to this module; the pipeline only ever sees these
//! traits, which keeps every stage testable with mocks and in-memory
//! doubles.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use keeper_domain::{CharacterId, CharacterSheet, EventId, KeeperEvent, MapId, ObjectId};
use keeper_shared::ServerMessage;

// =============================================================================
// KV service
// =============================================================================

/// Errors from the KV backend.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Backend unreachable or command failed.
    #[error("KV backend unavailable: {0}")]
    Unavailable(String),
}

/// The dynamic state backend: string keys, JSON string values, optional TTL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvPort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn put(&self, key: &str, value: String) -> Result<(), KvError>;
    async fn put_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError>;
    /// Liveness probe for `/health`.
    async fn ping(&self) -> bool;
}

// =============================================================================
// Relational catalog
// =============================================================================

/// Errors from the relational catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    #[error("Catalog row malformed: {0}")]
    Malformed(String),
}

impl CatalogError {
    pub fn database(operation: &'static str, err: impl ToString) -> Self {
        Self::Database {
            operation,
            message: err.to_string(),
        }
    }
}

/// Static map metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MapInfo {
    pub id: MapId,
    pub name: String,
    pub info: String,
}

/// An interactable object as the catalog describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogObject {
    pub object_id: ObjectId,
    pub name: String,
    pub current_state: serde_json::Value,
}

/// Read-mostly access to the scenario catalog.
///
/// The only write-backs are the NPC status/goal write-through from the
/// reactor loop and the player's location after a validated move.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogPort: Send + Sync {
    async fn character_sheet(
        &self,
        id: &CharacterId,
    ) -> Result<Option<CharacterSheet>, CatalogError>;
    async fn npcs_on_map(&self, map_id: MapId) -> Result<Vec<CharacterId>, CatalogError>;
    async fn objects_on_map(&self, map_id: MapId) -> Result<Vec<CatalogObject>, CatalogError>;
    async fn map_info(&self, map_id: MapId) -> Result<Option<MapInfo>, CatalogError>;
    async fn accessible_maps(&self, map_id: MapId) -> Result<Vec<MapId>, CatalogError>;
    async fn events_for_map(&self, map_id: MapId) -> Result<Vec<KeeperEvent>, CatalogError>;
    async fn event(&self, id: EventId) -> Result<Option<KeeperEvent>, CatalogError>;
    /// The world-state seed loaded once at process start.
    async fn world_seed(&self) -> Result<HashMap<String, serde_json::Value>, CatalogError>;
    async fn update_npc_state(
        &self,
        id: &CharacterId,
        status: &str,
        goal: &str,
    ) -> Result<(), CatalogError>;
    async fn update_character_location(
        &self,
        id: &CharacterId,
        map_id: MapId,
        vehicle_id: Option<i64>,
    ) -> Result<(), CatalogError>;
}

// =============================================================================
// LLM oracle
// =============================================================================

/// Errors from the LLM oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    RequestFailed(String),

    #[error("Oracle returned invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Oracle deadline exceeded")]
    Deadline,
}

impl OracleError {
    /// Deadline and parse failures both degrade the same way in every
    /// stage (spec: OracleDeadline handled as ParseFailure).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidJson(_) | Self::Deadline | Self::RequestFailed(_))
    }
}

/// One narrowly scoped structured-output question for the oracle.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
}

impl OracleRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The LLM behind intent parsing, soft matching, NPC reactions and fallback
/// narrative. Always answers strict JSON; never drives control flow.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OraclePort: Send + Sync {
    async fn generate(&self, request: OracleRequest) -> Result<serde_json::Value, OracleError>;
}

// =============================================================================
// Memory shelf
// =============================================================================

/// Errors from the external memory shelf.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Memory shelf unavailable: {0}")]
    Unavailable(String),
}

/// Recall snippets for one NPC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnippets {
    pub short_term: String,
    pub long_term: String,
}

/// The external NPC memory shelf. Failures never abort a turn; callers
/// degrade to empty snippets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryPort: Send + Sync {
    async fn recall(&self, npc_id: &CharacterId) -> Result<MemorySnippets, MemoryError>;
    async fn record(&self, npc_id: &CharacterId, observation: &str) -> Result<(), MemoryError>;
}

// =============================================================================
// Dice sink
// =============================================================================

/// Fan-out sink for skill-check results and state-refresh notifications.
///
/// Implementations must never block the producer; slow subscribers are
/// dropped, not waited on.
#[cfg_attr(test, mockall::automock)]
pub trait DiceSinkPort: Send + Sync {
    fn push(&self, message: ServerMessage);
}

// =============================================================================
// Randomness
// =============================================================================

/// d100 source, injectable so tests script every roll.
#[cfg_attr(test, mockall::automock)]
pub trait RandomPort: Send + Sync {
    /// Uniform integer in [1, 100].
    fn d100(&self) -> i64;
}
