//! Ollama LLM oracle (OpenAI-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{OracleError, OraclePort, OracleRequest};

/// Default Ollama base URL.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default model for Ollama.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";

/// Oracle client for Ollama's OpenAI-compatible API.
///
/// Every call is bounded by `deadline`; an expired call degrades exactly
/// like a parse failure at the stage that issued it.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    deadline: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, deadline: Duration) -> Self {
        // Client-level timeout is a backstop; the per-call deadline is
        // usually tighter.
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            deadline,
        }
    }

    /// Create client from environment variables, falling back to defaults.
    pub fn from_env(deadline: Duration) -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
        Self::new(&base_url, &model, deadline)
    }

    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let api_request = OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: request.user_prompt.clone(),
                },
            ],
            temperature: request.temperature,
            response_format: Some(ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        let send = async {
            let response = self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .json(&api_request)
                .send()
                .await
                .map_err(|e| OracleError::RequestFailed(e.to_string()))?;

            if !response.status().is_success() {
                let error_text = response
                    .text()
                    .await
                    .map_err(|e| OracleError::RequestFailed(e.to_string()))?;
                return Err(OracleError::RequestFailed(error_text));
            }

            let api_response: OpenAIChatResponse = response
                .json()
                .await
                .map_err(|e| OracleError::InvalidJson(e.to_string()))?;

            api_response
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| OracleError::InvalidJson("no choices in response".to_string()))
        };

        tokio::time::timeout(self.deadline, send)
            .await
            .map_err(|_| OracleError::Deadline)?
    }
}

#[async_trait]
impl OraclePort for OllamaClient {
    async fn generate(&self, request: OracleRequest) -> Result<serde_json::Value, OracleError> {
        let content = self.complete(&request).await?;
        parse_json_reply(&content)
    }
}

/// Parse a strict-JSON oracle reply, tolerating a markdown code fence.
fn parse_json_reply(content: &str) -> Result<serde_json::Value, OracleError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    serde_json::from_str(body).map_err(|e| OracleError::InvalidJson(e.to_string()))
}

// =============================================================================
// OpenAI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_replies_parse() {
        let value = parse_json_reply(r#"{"intent": "talk"}"#).expect("parse");
        assert_eq!(value["intent"], "talk");
    }

    #[test]
    fn fenced_replies_parse() {
        let value = parse_json_reply("```json\n{\"intent\": \"move\"}\n```").expect("parse");
        assert_eq!(value["intent"], "move");
    }

    #[test]
    fn prose_replies_are_invalid() {
        assert!(matches!(
            parse_json_reply("The fog thickens."),
            Err(OracleError::InvalidJson(_))
        ));
    }
}
