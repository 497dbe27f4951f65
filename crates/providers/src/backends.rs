//! Backend table: maps registry ids to the backend serving them.

use memoria_config::AppConfig;
use memoria_core::backend::ModelBackend;
use memoria_core::error::Error;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::echo::EchoBackend;
use crate::openai_compat::OpenAiCompatBackend;

#[derive(Default, Clone)]
pub struct BackendSet {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own id, replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        self.backends.insert(backend.id().to_string(), backend);
    }

    pub fn with(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.get(id).cloned()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Build one backend per `[[models]]` entry.
pub fn build_from_config(config: &AppConfig) -> Result<BackendSet, Error> {
    let mut set = BackendSet::new();

    for model in &config.models {
        let backend: Arc<dyn ModelBackend> = match model.kind.as_str() {
            "ollama" => Arc::new(OpenAiCompatBackend::ollama(
                &model.id,
                model.base_url.as_deref(),
                model.remote_model(),
            )),
            "openai_compat" => {
                let base_url = model.base_url.as_deref().ok_or_else(|| Error::Config {
                    message: format!("model '{}' of kind openai_compat needs base_url", model.id),
                })?;
                Arc::new(OpenAiCompatBackend::new(
                    &model.id,
                    base_url,
                    model.api_key.clone().unwrap_or_default(),
                    model.remote_model(),
                ))
            }
            "echo" => Arc::new(EchoBackend::new(&model.id)),
            other => {
                return Err(Error::Config {
                    message: format!("model '{}' has unknown kind '{other}'", model.id),
                });
            }
        };
        set.register(backend);
    }

    info!(models = ?set.ids(), "Model backends ready");
    Ok(set)
}
