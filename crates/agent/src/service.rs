//! The chat service: the request/response contract over the whole core.
//!
//! Constructed once at startup and shared by handle. Holds the Context
//! Store, Link Registry, Model Registry and the components built on them;
//! nothing here is ambient global state.

use chrono::Utc;
use memoria_config::AppConfig;
use memoria_core::error::{Error, RoutingError, StorageError};
use memoria_core::model::{ModelDescriptor, ReasonCode, TaskCategory};
use memoria_core::store::KvStore;
use memoria_core::turn::{ConversationId, DeviceId, Turn};
use memoria_memory::{ContextStore, FileKv, InMemoryKv, LinkRegistry, SqliteKv};
use memoria_providers::{
    BackendSet, Classifier, HealthProbe, KeywordClassifier, ModelRegistry, ModelStatus,
    ResourceBudget, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::context::{ContextAssembler, ContextWindow};
use crate::invoker::{Invocation, Invoker, InvokerSettings};

/// Send-message input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    pub device_id: DeviceId,
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub model_override: Option<String>,
}

impl SendMessage {
    pub fn new(device_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            device_id: DeviceId::new(device_id),
            message: message.into(),
            conversation_id: None,
            model_override: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_override = Some(model_id.into());
        self
    }
}

/// Send-message output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub response_text: String,
    pub model_used: String,
    /// Whether any prior turns were supplied to the model.
    pub context_used: bool,
    pub conversation_id: ConversationId,
    /// `None` when a model override bypassed classification.
    pub category: Option<TaskCategory>,
    pub reason_code: ReasonCode,
    pub attempts: usize,
}

pub struct ChatService {
    kv: Arc<dyn KvStore>,
    store: Arc<ContextStore>,
    links: Arc<LinkRegistry>,
    registry: Arc<ModelRegistry>,
    backends: Arc<BackendSet>,
    assembler: ContextAssembler,
    classifier: Arc<dyn Classifier>,
    router: Router,
    invoker: Invoker,
    audit: Arc<AuditLog>,
}

impl ChatService {
    pub fn builder(descriptors: Vec<ModelDescriptor>, backends: BackendSet) -> ChatServiceBuilder {
        ChatServiceBuilder::new(descriptors, backends)
    }

    /// Build the service from configuration: storage backing, model
    /// catalog, backends, and every bound.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let kv = open_kv(config).await?;
        let backends = memoria_providers::build_from_config(config)?;

        ChatServiceBuilder::new(config.descriptors(), backends)
            .kv(kv)
            .generic_model(&config.router.generic_model)
            .budget(ResourceBudget {
                max_ram: config.router.max_ram,
                max_latency: config.router.max_latency,
            })
            .window(ContextWindow {
                max_turns: config.context.max_turns,
                max_chars: config.context.max_chars,
            })
            .retention(config.memory.retention_turns)
            .invoker(InvokerSettings {
                timeout: Duration::from_secs(config.invoker.timeout_secs),
                max_attempts: config.invoker.max_attempts,
                cooldown: Duration::from_secs(config.invoker.cooldown_secs),
                retry_after_secs: config.invoker.retry_after_secs,
            })
            .build()
            .await
    }

    /// Handle one message end to end: assemble, classify, route, invoke.
    pub async fn send_message(&self, request: SendMessage) -> Result<SendMessageResponse, Error> {
        validate_device(&request.device_id)?;
        if request.message.trim().is_empty() {
            return Err(Error::InvalidRequest("message must not be empty".into()));
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let device = request.device_id;
        let conversation_id = request.conversation_id.unwrap_or_default();

        let context = self.assembler.assemble(&device).await?;

        let overridden = request.model_override.as_deref().and_then(|model_id| {
            let decision = self.router.route_override(model_id);
            if decision.is_none() {
                debug!(model_id, "Override not usable, routing normally");
            }
            decision
        });

        let (category, decision) = match overridden {
            Some(decision) => (None, decision),
            None => {
                let category = self.classifier.classify(&request.message);
                match self.router.route(category) {
                    Ok(decision) => (Some(category), decision),
                    Err(e) => {
                        self.audit_unroutable(&request_id, &device, category, &e);
                        return Err(e.into());
                    }
                }
            }
        };

        let context_used = !context.is_empty();
        let reason_code = decision.reason_code;
        let outcome = self
            .invoker
            .invoke(Invocation {
                request_id,
                device_id: device,
                conversation_id: conversation_id.clone(),
                category,
                decision,
                context: context.turns,
                message: request.message,
            })
            .await?;

        Ok(SendMessageResponse {
            response_text: outcome.response_text,
            model_used: outcome.model_used,
            context_used,
            conversation_id,
            category,
            reason_code,
            attempts: outcome.attempts,
        })
    }

    /// Link two devices. Idempotent.
    pub async fn link_devices(&self, device: &DeviceId, target: &DeviceId) -> Result<bool, Error> {
        validate_device(device)?;
        validate_device(target)?;
        Ok(self.links.link(device, target).await?)
    }

    /// Unlink two devices. Unlinking a pair that isn't linked succeeds.
    pub async fn unlink_devices(&self, device: &DeviceId, target: &DeviceId) -> Result<bool, Error> {
        validate_device(device)?;
        validate_device(target)?;
        Ok(self.links.unlink(device, target).await?)
    }

    /// A device's most recent turns, most recent last.
    pub async fn read_memory(&self, device: &DeviceId, limit: usize) -> Result<Vec<Turn>, Error> {
        validate_device(device)?;
        Ok(self.store.read(device, limit).await?)
    }

    /// Remove every turn of one conversation. Returns how many were removed.
    pub async fn delete_conversation(
        &self,
        device: &DeviceId,
        conversation_id: &ConversationId,
    ) -> Result<usize, Error> {
        validate_device(device)?;
        Ok(self.store.delete_conversation(device, conversation_id).await?)
    }

    pub fn linked_devices(&self, device: &DeviceId) -> Vec<DeviceId> {
        self.links.neighbors(device).into_iter().collect()
    }

    pub fn model_status(&self) -> BTreeMap<String, ModelStatus> {
        self.registry.status()
    }

    /// A health probe over this service's models, persisting to its store.
    pub fn health_probe(&self, interval: Duration) -> HealthProbe {
        HealthProbe::new(self.registry.clone(), self.backends.clone(), interval)
            .with_store(self.kv.clone())
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn storage_backend(&self) -> &str {
        self.store.backend_name()
    }

    pub fn window(&self) -> ContextWindow {
        self.assembler.window()
    }

    fn audit_unroutable(
        &self,
        request_id: &str,
        device: &DeviceId,
        category: TaskCategory,
        error: &RoutingError,
    ) {
        let reason_code = match error {
            RoutingError::NoModelAvailable { .. } => ReasonCode::NoModelAvailable,
            RoutingError::AllModelsFailed { .. } => ReasonCode::AllModelsFailed,
        };
        self.audit.record(AuditEntry {
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            device_id: device.clone(),
            outcome: AuditOutcome::Exhausted,
            reason_code,
            routing_reason: None,
            category: Some(category),
            model_used: None,
            attempts: 0,
            chain: Vec::new(),
        });
    }
}

fn validate_device(device: &DeviceId) -> Result<(), Error> {
    if device.as_str().trim().is_empty() {
        return Err(Error::InvalidRequest("device_id must not be empty".into()));
    }
    Ok(())
}

/// Open the key-value backing named by `[memory] backend`.
pub async fn open_kv(config: &AppConfig) -> Result<Arc<dyn KvStore>, Error> {
    let data_dir = config.data_dir();
    let kv: Arc<dyn KvStore> = match config.memory.backend.as_str() {
        "in_memory" => Arc::new(InMemoryKv::new()),
        "file" => Arc::new(FileKv::new(data_dir.join("kv"))?),
        "sqlite" => {
            std::fs::create_dir_all(&data_dir)
                .map_err(|e| StorageError::io(data_dir.display().to_string(), e))?;
            let url = format!("sqlite://{}", data_dir.join("memoria.db").display());
            Arc::new(SqliteKv::new(&url).await?)
        }
        other => {
            return Err(Error::Config {
                message: format!("unknown memory backend '{other}'"),
            });
        }
    };
    info!(backend = kv.name(), data_dir = %data_dir.display(), "Storage opened");
    Ok(kv)
}

/// Step-by-step construction of a [`ChatService`].
pub struct ChatServiceBuilder {
    descriptors: Vec<ModelDescriptor>,
    backends: BackendSet,
    kv: Option<Arc<dyn KvStore>>,
    generic_model: Option<String>,
    budget: ResourceBudget,
    window: ContextWindow,
    retention: usize,
    invoker: InvokerSettings,
    classifier: Arc<dyn Classifier>,
    audit_capacity: usize,
}

impl ChatServiceBuilder {
    pub fn new(descriptors: Vec<ModelDescriptor>, backends: BackendSet) -> Self {
        Self {
            descriptors,
            backends,
            kv: None,
            generic_model: None,
            budget: ResourceBudget::default(),
            window: ContextWindow::default(),
            retention: 500,
            invoker: InvokerSettings::default(),
            classifier: Arc::new(KeywordClassifier::default()),
            audit_capacity: 1000,
        }
    }

    /// Storage backing. Defaults to an in-memory map.
    pub fn kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Designated generic model. Defaults to the first descriptor by rank.
    pub fn generic_model(mut self, id: impl Into<String>) -> Self {
        self.generic_model = Some(id.into());
        self
    }

    pub fn budget(mut self, budget: ResourceBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        self
    }

    /// Turns kept per device.
    pub fn retention(mut self, turns: usize) -> Self {
        self.retention = turns;
        self
    }

    pub fn invoker(mut self, settings: InvokerSettings) -> Self {
        self.invoker = settings;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }

    pub async fn build(self) -> Result<ChatService, Error> {
        let kv = self.kv.unwrap_or_else(|| Arc::new(InMemoryKv::new()));

        let generic_model = self.generic_model.or_else(|| {
            self.descriptors
                .iter()
                .min_by(|a, b| a.priority_rank.cmp(&b.priority_rank).then_with(|| a.id.cmp(&b.id)))
                .map(|d| d.id.clone())
        });
        let Some(generic_model) = generic_model else {
            return Err(Error::Config {
                message: "at least one model must be configured".into(),
            });
        };

        for descriptor in &self.descriptors {
            if self.backends.get(&descriptor.id).is_none() {
                warn!(model_id = %descriptor.id, "Model has no backend; calls to it will fail over");
            }
        }

        let registry = Arc::new(ModelRegistry::new(self.descriptors));
        let restored = registry.restore(kv.as_ref()).await?;
        if restored > 0 {
            debug!(restored, "Restored model availability");
        }

        let store = Arc::new(ContextStore::new(kv.clone(), self.retention.max(self.window.max_turns)));
        let links = Arc::new(LinkRegistry::open(kv.clone()).await?);
        let backends = Arc::new(self.backends);
        let audit = Arc::new(AuditLog::new(self.audit_capacity));

        let router = Router::new(registry.clone(), generic_model)
            .with_budget(self.budget)
            .with_retry_after(self.invoker.retry_after_secs);
        let assembler = ContextAssembler::new(store.clone(), links.clone(), self.window);
        let invoker = Invoker::new(
            registry.clone(),
            backends.clone(),
            store.clone(),
            audit.clone(),
            self.invoker,
        );

        info!(
            models = registry.len(),
            generic_model = router.generic_model(),
            backend = store.backend_name(),
            "Chat service ready"
        );

        Ok(ChatService {
            kv,
            store,
            links,
            registry,
            backends,
            assembler,
            classifier: self.classifier,
            router,
            invoker,
            audit,
        })
    }
}
