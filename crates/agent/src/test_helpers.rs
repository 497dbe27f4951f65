//! Shared test helpers.

use async_trait::async_trait;
use memoria_core::backend::{GenerateRequest, ModelBackend};
use memoria_core::error::ModelError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A backend with a fixed reply that can be told to fail or stall.
pub struct ScriptedBackend {
    id: String,
    reply: String,
    delay: Option<Duration>,
    failing: AtomicBool,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl ScriptedBackend {
    pub fn ok(id: &str, reply: &str) -> Self {
        Self {
            id: id.into(),
            reply: reply.into(),
            delay: None,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing(id: &str) -> Self {
        let backend = Self::ok(id, "");
        backend.set_failing(true);
        backend
    }

    pub fn slow(id: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok(id, "slow reply")
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ModelError::Failed {
                model_id: self.id.clone(),
                reason: "scripted failure".into(),
            });
        }
        Ok(self.reply.clone())
    }

    async fn health_check(&self) -> Result<bool, ModelError> {
        Ok(!self.failing.load(Ordering::SeqCst))
    }
}
