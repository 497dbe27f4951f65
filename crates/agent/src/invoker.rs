//! Invoker: runs a routing decision's fallback chain.
//!
//! Each attempt calls one model under the timeout **T**. A timeout or
//! failure marks that model degraded for the cool-down window and moves to
//! the next model, for at most **K** attempts. On success the user turn and
//! the assistant turn are committed to the Context Store in one batch. If the
//! call is cancelled before that point, nothing is written.

use chrono::Utc;
use memoria_core::backend::{ContextTurn, GenerateRequest};
use memoria_core::error::{Error, ModelError, RoutingError};
use memoria_core::model::{ReasonCode, RoutingDecision, TaskCategory};
use memoria_core::turn::{ConversationId, DeviceId, Turn};
use memoria_memory::ContextStore;
use memoria_providers::{BackendSet, ModelRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};

/// Timeout, attempt and cool-down policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokerSettings {
    /// T
    pub timeout: Duration,
    /// K
    pub max_attempts: usize,
    pub cooldown: Duration,
    /// Hint returned with `AllModelsFailed`.
    pub retry_after_secs: u64,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            cooldown: Duration::from_secs(120),
            retry_after_secs: 30,
        }
    }
}

/// One request, already routed.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub request_id: String,
    pub device_id: DeviceId,
    pub conversation_id: ConversationId,
    pub category: Option<TaskCategory>,
    pub decision: RoutingDecision,
    pub context: Vec<ContextTurn>,
    pub message: String,
}

/// A successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub response_text: String,
    pub model_used: String,
    pub attempts: usize,
}

pub struct Invoker {
    registry: Arc<ModelRegistry>,
    backends: Arc<BackendSet>,
    store: Arc<ContextStore>,
    audit: Arc<AuditLog>,
    settings: InvokerSettings,
}

impl Invoker {
    pub fn new(
        registry: Arc<ModelRegistry>,
        backends: Arc<BackendSet>,
        store: Arc<ContextStore>,
        audit: Arc<AuditLog>,
        settings: InvokerSettings,
    ) -> Self {
        Self {
            registry,
            backends,
            store,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> InvokerSettings {
        self.settings
    }

    /// Walk the fallback chain until a model answers or attempts run out.
    pub async fn invoke(&self, invocation: Invocation) -> Result<InvocationOutcome, Error> {
        let user_turn = Turn::user(
            invocation.device_id.clone(),
            invocation.conversation_id.clone(),
            invocation.message.clone(),
        );

        let mut attempts = 0;
        let mut last_error: Option<ModelError> = None;

        for model_id in invocation
            .decision
            .fallback_chain
            .iter()
            .take(self.settings.max_attempts)
        {
            attempts += 1;
            debug!(
                request_id = %invocation.request_id,
                model = %model_id,
                attempt = attempts,
                "Invoking model"
            );

            match self.call(model_id, &invocation).await {
                Ok(text) => {
                    let assistant_turn = Turn::assistant(
                        invocation.device_id.clone(),
                        invocation.conversation_id.clone(),
                        text.clone(),
                        model_id.clone(),
                    );
                    // The reply is never stamped before the message.
                    let assistant_turn = if assistant_turn.timestamp < user_turn.timestamp {
                        let ts = user_turn.timestamp;
                        assistant_turn.at(ts)
                    } else {
                        assistant_turn
                    };
                    self.store
                        .append_all(vec![user_turn, assistant_turn])
                        .await?;

                    info!(
                        request_id = %invocation.request_id,
                        device_id = %invocation.device_id,
                        model = %model_id,
                        attempt = attempts,
                        "Model answered"
                    );
                    self.audit.record(self.entry(
                        &invocation,
                        AuditOutcome::Success,
                        ReasonCode::Served,
                        Some(model_id.clone()),
                        attempts,
                    ));
                    return Ok(InvocationOutcome {
                        response_text: text,
                        model_used: model_id.clone(),
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(
                        request_id = %invocation.request_id,
                        model = %model_id,
                        attempt = attempts,
                        error = %e,
                        "Model attempt failed, falling back"
                    );
                    self.registry.mark_degraded(model_id, self.settings.cooldown);
                    last_error = Some(e);
                }
            }
        }

        self.audit.record(self.entry(
            &invocation,
            AuditOutcome::Exhausted,
            ReasonCode::AllModelsFailed,
            None,
            attempts,
        ));
        Err(RoutingError::AllModelsFailed {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "empty fallback chain".into()),
            retry_after_secs: self.settings.retry_after_secs,
        }
        .into())
    }

    async fn call(&self, model_id: &str, invocation: &Invocation) -> Result<String, ModelError> {
        let backend = self
            .backends
            .get(model_id)
            .ok_or_else(|| ModelError::NotRegistered(model_id.to_string()))?;

        let request = GenerateRequest {
            model_id: model_id.to_string(),
            device_id: invocation.device_id.clone(),
            context: invocation.context.clone(),
            message: invocation.message.clone(),
        };

        match tokio::time::timeout(self.settings.timeout, backend.generate(request)).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(ModelError::Failed {
                model_id: model_id.to_string(),
                reason: "empty reply".into(),
            }),
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                model_id: model_id.to_string(),
                timeout_ms: self.settings.timeout.as_millis() as u64,
            }),
        }
    }

    fn entry(
        &self,
        invocation: &Invocation,
        outcome: AuditOutcome,
        reason_code: ReasonCode,
        model_used: Option<String>,
        attempts: usize,
    ) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            request_id: invocation.request_id.clone(),
            device_id: invocation.device_id.clone(),
            outcome,
            reason_code,
            routing_reason: Some(invocation.decision.reason_code),
            category: invocation.category,
            model_used,
            attempts,
            chain: invocation.decision.fallback_chain.clone(),
        }
    }
}
