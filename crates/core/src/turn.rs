//! Device, conversation, and turn domain types.
//!
//! These are the value objects that flow through the memory layer:
//! a device sends a message → the exchange is committed as two turns →
//! later requests replay those turns as context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque client identifier used for memory isolation.
///
/// A device carries no identity attributes; it is never tied to a person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a conversation (session) on a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single immutable entry in a device's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Device that owns this turn
    pub device_id: DeviceId,

    /// Conversation the turn belongs to
    pub conversation_id: ConversationId,

    /// Who said it
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the turn was written
    pub timestamp: DateTime<Utc>,

    /// Model that produced an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl Turn {
    /// Create a user turn stamped with the current time.
    pub fn user(
        device_id: DeviceId,
        conversation_id: ConversationId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            device_id,
            conversation_id,
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            model_used: None,
        }
    }

    /// Create an assistant turn recording the model that answered.
    pub fn assistant(
        device_id: DeviceId,
        conversation_id: ConversationId,
        content: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            device_id,
            conversation_id,
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            model_used: Some(model_used.into()),
        }
    }

    /// Override the timestamp (used when replaying or in tests).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Character length of the content, as counted against the context budget.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
