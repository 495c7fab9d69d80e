//! Keeper Engine - backend for an AI-driven Call of Cthulhu session.
//!
//! The engine:
//! - drives one deterministic orchestrator turn per `/api/chat` call
//! - keeps dynamic game state in Redis, the scenario catalog in SQLite
//! - asks an Ollama-hosted LLM narrowly scoped structured questions
//! - streams dice results to clients over `/ws/dice`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keeper_engine::api::dice_ws::{self, DiceHub};
use keeper_engine::api::http;
use keeper_engine::config::AppConfig;
use keeper_engine::infrastructure::catalog::SqliteCatalog;
use keeper_engine::infrastructure::memory_shelf::{HttpMemoryShelf, NullMemoryShelf};
use keeper_engine::infrastructure::ollama::OllamaClient;
use keeper_engine::infrastructure::ports::MemoryPort;
use keeper_engine::infrastructure::random::SystemRandom;
use keeper_engine::infrastructure::redis_kv::RedisKv;
use keeper_engine::stores::Stores;
use keeper_engine::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keeper_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keeper Engine");

    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Redis: {}", config.redis_url);
    tracing::info!("  Catalog: {}", config.database_url);
    tracing::info!("  Ollama: {}", config.ollama_base_url);

    let kv = RedisKv::connect(&config.redis_url)
        .await
        .map_err(|e| anyhow::anyhow!("redis connection failed: {e}"))?;
    let stores = Stores::new(Arc::new(kv));

    let catalog = SqliteCatalog::connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("catalog connection failed: {e}"))?;

    let oracle = OllamaClient::new(
        &config.ollama_base_url,
        &config.ollama_model,
        config.oracle_timeout,
    );
    let memory: Arc<dyn MemoryPort> = match &config.memory_shelf_url {
        Some(url) => Arc::new(HttpMemoryShelf::new(url)),
        None => {
            tracing::info!("No memory shelf configured, NPC recall disabled");
            Arc::new(NullMemoryShelf)
        }
    };

    let dice_hub = Arc::new(DiceHub::new());
    let app = Arc::new(App::new(
        stores,
        Arc::new(catalog),
        Arc::new(oracle),
        memory,
        dice_hub,
        Arc::new(SystemRandom::new()),
    ));

    app.seed_world_state()
        .await
        .map_err(|e| anyhow::anyhow!("world state seed failed: {e}"))?;
    tracing::info!("Application state initialized");

    let router = Router::new()
        .route("/health", get(http::health))
        .route("/ws/dice", get(dice_ws::ws_handler))
        .merge(http::routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
