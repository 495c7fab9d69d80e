//! Environment-driven configuration.

use std::time::Duration;

use anyhow::Context;

/// Everything the engine reads from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub redis_url: String,
    pub database_url: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    /// Per-call deadline for every oracle question.
    pub oracle_timeout: Duration,
    /// External memory shelf; None runs with the no-op shelf.
    pub memory_shelf_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = match std::env::var("SERVER_PORT") {
            Ok(raw) => raw.parse().context("SERVER_PORT must be a port number")?,
            Err(_) => 8000,
        };
        let oracle_timeout_secs: u64 = match std::env::var("ORACLE_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse()
                .context("ORACLE_TIMEOUT_SECS must be an integer")?,
            Err(_) => 30,
        };
        Ok(Self {
            server_port,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://database.db".to_string()),
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| crate::infrastructure::ollama::DEFAULT_OLLAMA_BASE_URL.to_string()),
            ollama_model: std::env::var("OLLAMA_MODEL")
                .unwrap_or_else(|_| crate::infrastructure::ollama::DEFAULT_OLLAMA_MODEL.to_string()),
            oracle_timeout: Duration::from_secs(oracle_timeout_secs),
            memory_shelf_url: std::env::var("MEMORY_SHELF_URL").ok(),
        })
    }
}
