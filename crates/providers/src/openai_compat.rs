//! OpenAI-compatible model backend.
//!
//! Works with: Ollama, vLLM, llama.cpp server, LM Studio, OpenAI, and any
//! endpoint exposing `/chat/completions` and `/models`.
//!
//! Turns that came from a linked device are prefixed with their origin so
//! the model can tell the two conversations apart.

use async_trait::async_trait;
use memoria_core::backend::{ContextTurn, GenerateRequest, ModelBackend};
use memoria_core::error::ModelError;
use memoria_core::turn::Role;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Earlier turns prefixed with \
[from device <id>] were written on another of the user's linked devices.";

/// A model served over an OpenAI-compatible HTTP API.
pub struct OpenAiCompatBackend {
    id: String,
    base_url: String,
    api_key: String,
    remote_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        remote_model: impl Into<String>,
    ) -> Self {
        // The invoker enforces the per-call deadline; this is only a backstop.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            remote_model: remote_model.into(),
            client,
        }
    }

    /// A model served by a local Ollama instance.
    pub fn ollama(id: impl Into<String>, base_url: Option<&str>, remote_model: impl Into<String>) -> Self {
        Self::new(
            id,
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            remote_model,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn render_turn(turn: &ContextTurn) -> ApiMessage {
        let content = if turn.linked {
            format!("[from device {}] {}", turn.origin_device, turn.content)
        } else {
            turn.content.clone()
        };
        ApiMessage {
            role: turn.role.as_str().into(),
            content: Some(content),
        }
    }

    /// Convert a request to OpenAI API messages: system prompt, context, new message.
    fn to_api_messages(request: &GenerateRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(request.context.len() + 2);
        messages.push(ApiMessage {
            role: "system".into(),
            content: Some(SYSTEM_PROMPT.into()),
        });
        messages.extend(request.context.iter().map(Self::render_turn));
        messages.push(ApiMessage {
            role: Role::User.as_str().into(),
            content: Some(request.message.clone()),
        });
        messages
    }

    fn parse_response(&self, api_response: ApiResponse) -> Result<String, ModelError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| self.failed("No choices in response"))?;
        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(self.failed("empty content")),
        }
    }

    fn failed(&self, reason: impl Into<String>) -> ModelError {
        ModelError::Failed {
            model_id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.remote_model,
            "messages": Self::to_api_messages(&request),
            "stream": false,
        });

        debug!(
            model_id = %self.id,
            remote_model = %self.remote_model,
            context_turns = request.context.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.failed(format!("network: {e}")))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(self.failed("rate limited"));
        }

        if status == 401 || status == 403 {
            return Err(self.failed("invalid API key or insufficient permissions"));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(model_id = %self.id, status, body = %error_body, "Model endpoint returned error");
            return Err(self.failed(format!("HTTP {status}: {error_body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| self.failed(format!("Failed to parse response: {e}")))?;

        self.parse_response(api_response)
    }

    async fn health_check(&self) -> Result<bool, ModelError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| self.failed(format!("network: {e}")))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}
