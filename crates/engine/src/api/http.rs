//! HTTP routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use keeper_domain::CharacterId;
use keeper_shared::{
    CharacterDataResponse, CharacterEnteredRequest, CharacterEnteredResponse, CharacterStatusView,
    ChatRequest, ChatResponse, HealthResponse, StoreHealth,
};

use crate::app::App;
use crate::turn::TurnError;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/api/character_entered", post(character_entered))
        .route("/api/chat", post(chat))
        .route("/api/character_data", get(character_data))
        .route("/api/character_sheet/{id}", get(character_sheet))
        .route("/api/session_state/{id}", get(session_state))
}

/// `GET /health`
pub async fn health(State(app): State<Arc<App>>) -> Json<HealthResponse> {
    let redis = if app.stores.ping().await {
        StoreHealth::Connected
    } else {
        StoreHealth::Disconnected
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        redis,
    })
}

async fn character_entered(
    State(app): State<Arc<App>>,
    Json(request): Json<CharacterEnteredRequest>,
) -> Result<Json<CharacterEnteredResponse>, ApiError> {
    let id = CharacterId::new(request.character_id);
    let loaded = app.enter_character(&id).await.map_err(ApiError::from)?;
    Ok(Json(CharacterEnteredResponse {
        status: "success".to_string(),
        npcs_loaded: loaded.npcs,
        objects_loaded: loaded.objects,
    }))
}

async fn chat(
    State(app): State<Arc<App>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Some(player_id) = app.current_character().await else {
        return Err(ApiError::BadRequest(
            "no character has entered the session".to_string(),
        ));
    };
    let outcome = app
        .turns
        .run_turn(&player_id, &request.input)
        .await
        .map_err(ApiError::from)?;
    let history = outcome
        .conversation_history
        .iter()
        .filter_map(|entry| serde_json::to_value(entry).ok())
        .collect();
    Ok(Json(ChatResponse {
        reply: outcome.reply,
        conversation_history: Some(history),
    }))
}

#[derive(Deserialize)]
struct CharacterDataParams {
    character_id: String,
}

async fn character_data(
    State(app): State<Arc<App>>,
    Query(params): Query<CharacterDataParams>,
) -> Result<Json<CharacterDataResponse>, ApiError> {
    let id = CharacterId::new(params.character_id);
    let (sheet, session) = app.character_view(&id).await.map_err(ApiError::from)?;
    // Serialization of domain blobs cannot fail here; fall back to null to
    // keep the endpoint total.
    Ok(Json(CharacterDataResponse {
        info: serde_json::to_value(&sheet.info).unwrap_or_default(),
        attributes: serde_json::to_value(sheet.attributes).unwrap_or_default(),
        derived_attributes: serde_json::to_value(sheet.derived_attributes).unwrap_or_default(),
        skills: serde_json::to_value(sheet.skills).unwrap_or_default(),
        backgrounds: serde_json::to_value(&sheet.backgrounds).unwrap_or_default(),
        status: CharacterStatusView {
            hit_points: session.hp,
            magic_points: session.mp,
            sanity: session.sanity,
            current_map_id: session.current_map_id.value(),
            current_vehicle_id: session.current_vehicle_id,
        },
    }))
}

async fn character_sheet(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = CharacterId::new(id);
    let (sheet, _) = app.character_view(&id).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::to_value(&sheet).unwrap_or_default()))
}

async fn session_state(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = CharacterId::new(id);
    let (_, session) = app.character_view(&id).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::to_value(&session).unwrap_or_default()))
}

// =============================================================================
// Error mapping
// =============================================================================

/// API-level error with its HTTP status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::TurnInFlight => Self::Conflict(err.to_string()),
            TurnError::EntityMissing { .. } => Self::NotFound(err.to_string()),
            TurnError::StoreUnavailable(_) => Self::ServiceUnavailable(err.to_string()),
            TurnError::Catalog(_) | TurnError::Internal(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, message),
            Self::ServiceUnavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            Self::Internal(message) => {
                tracing::error!(%message, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(serde_json::json!({ "detail": message }))).into_response()
    }
}
