//! Error types for the Memoria domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Only storage failures and routing exhaustion are meant to reach a caller;
//! per-model failures are absorbed by the fallback chain.

use thiserror::Error;

/// The top-level error type for all Memoria operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Model invocation errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Routing errors ---
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    // --- Request validation ---
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable, machine-readable reason code for user-visible failures.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage_unavailable",
            Self::Model(ModelError::Timeout { .. }) => "model_timeout",
            Self::Model(_) => "model_error",
            Self::Routing(RoutingError::NoModelAvailable { .. }) => "no_model_available",
            Self::Routing(RoutingError::AllModelsFailed { .. }) => "all_models_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Config { .. } => "config_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Retry-after hint (seconds) for terminal routing failures.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Routing(RoutingError::NoModelAvailable { retry_after_secs, .. })
            | Self::Routing(RoutingError::AllModelsFailed { retry_after_secs, .. }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A single backing-store operation failed. Retried once by callers.
    #[error("I/O failure on '{key}': {reason}")]
    Io { key: String, reason: String },

    /// A stored record could not be decoded.
    #[error("Corrupt record under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// The store failed twice in a row; surfaced to the caller.
    #[error("Storage unavailable for '{key}': {reason}")]
    Unavailable { key: String, reason: String },
}

impl StorageError {
    pub fn io(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Io {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model '{model_id}' timed out after {timeout_ms}ms")]
    Timeout { model_id: String, timeout_ms: u64 },

    #[error("Model '{model_id}' failed: {reason}")]
    Failed { model_id: String, reason: String },

    #[error("No backend registered for model '{0}'")]
    NotRegistered(String),
}

impl ModelError {
    /// The model this failure belongs to.
    pub fn model_id(&self) -> &str {
        match self {
            Self::Timeout { model_id, .. } | Self::Failed { model_id, .. } => model_id,
            Self::NotRegistered(id) => id,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    #[error("No model available for category '{category}', retry after {retry_after_secs}s")]
    NoModelAvailable {
        category: String,
        retry_after_secs: u64,
    },

    #[error("All {attempts} attempt(s) failed (last: {last_error}), retry after {retry_after_secs}s")]
    AllModelsFailed {
        attempts: usize,
        last_error: String,
        retry_after_secs: u64,
    },
}
