//! Echo backend: answers without calling any model.
//!
//! Useful for trying the service offline and for smoke tests. The reply
//! mentions how much context was supplied so linking can be observed.

use async_trait::async_trait;
use memoria_core::backend::{GenerateRequest, ModelBackend};
use memoria_core::error::ModelError;

pub struct EchoBackend {
    id: String,
}

impl EchoBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl ModelBackend for EchoBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ModelError> {
        let linked = request.context.iter().filter(|t| t.linked).count();
        Ok(format!(
            "[{}] {} (context: {} turns, {} linked)",
            self.id,
            request.message,
            request.context.len(),
            linked
        ))
    }
}
