//! ModelBackend trait: the abstraction over a language model.
//!
//! The runtime treats every model as an opaque `generate` operation. It
//! knows nothing about the model beyond the registry descriptor and this
//! trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::turn::{DeviceId, Role};

/// One turn of assembled context, tagged with the device it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTurn {
    /// Device that originally wrote this turn
    pub origin_device: DeviceId,
    /// True when the origin is a linked device rather than the requester
    pub linked: bool,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything a model needs to answer one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Registry id of the model being called
    pub model_id: String,
    /// The device asking
    pub device_id: DeviceId,
    /// Prior turns, oldest first
    pub context: Vec<ContextTurn>,
    /// The new user message
    pub message: String,
}

/// The core ModelBackend trait.
///
/// Implementations: OpenAI-compatible HTTP endpoints (Ollama, vLLM,
/// llama.cpp, hosted APIs) and scripted backends in tests.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Registry id this backend serves.
    fn id(&self) -> &str;

    /// Produce a reply for `request`.
    async fn generate(&self, request: GenerateRequest) -> Result<String, ModelError>;

    /// Health check: can the model be reached right now?
    async fn health_check(&self) -> Result<bool, ModelError> {
        Ok(true)
    }
}
