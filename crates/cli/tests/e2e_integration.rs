//! End-to-end integration tests for the Memoria core.
//!
//! These drive the chat service the way the gateway and CLI do: a message
//! goes in, context is assembled, the task is classified and routed, a
//! backend answers, and the exchange lands in storage.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use memoria_agent::{AuditOutcome, ChatService, ContextWindow, InvokerSettings, SendMessage};
use memoria_core::backend::{GenerateRequest, ModelBackend};
use memoria_core::error::{Error, ModelError, RoutingError};
use memoria_core::model::{Availability, ModelDescriptor, ReasonCode, TaskCategory};
use memoria_core::store::KvStore;
use memoria_core::turn::{DeviceId, Role};
use memoria_memory::FileKv;
use memoria_providers::{BackendSet, classify};

// ── Scripted Backend ─────────────────────────────────────────────────────

/// Replies with its own id and records what it was asked.
struct ScriptedBackend {
    id: String,
    down: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> GenerateRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("backend was never called")
    }
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.down.load(Ordering::SeqCst) {
            return Err(ModelError::Failed {
                model_id: self.id.clone(),
                reason: "connection refused".into(),
            });
        }
        Ok(format!("{} says hi to {}", self.id, request.device_id))
    }

    async fn health_check(&self) -> Result<bool, ModelError> {
        Ok(!self.down.load(Ordering::SeqCst))
    }
}

struct Fleet {
    coder: Arc<ScriptedBackend>,
    llama: Arc<ScriptedBackend>,
    phi: Arc<ScriptedBackend>,
}

impl Fleet {
    fn new() -> Self {
        Self {
            coder: ScriptedBackend::new("coder"),
            llama: ScriptedBackend::new("llama"),
            phi: ScriptedBackend::new("phi"),
        }
    }

    fn descriptors() -> Vec<ModelDescriptor> {
        vec![
            ModelDescriptor::new("coder", ["coding"], 1),
            ModelDescriptor::new("llama", ["general", "coding", "complex_analysis"], 2),
            ModelDescriptor::new("phi", ["simple", "general"], 3),
        ]
    }

    fn backends(&self) -> BackendSet {
        BackendSet::new()
            .with(self.coder.clone())
            .with(self.llama.clone())
            .with(self.phi.clone())
    }

    async fn service(&self) -> ChatService {
        ChatService::builder(Self::descriptors(), self.backends())
            .generic_model("llama")
            .build()
            .await
            .unwrap()
    }
}

fn settings() -> InvokerSettings {
    InvokerSettings {
        timeout: Duration::from_secs(5),
        max_attempts: 3,
        cooldown: Duration::from_secs(120),
        retry_after_secs: 30,
    }
}

// ── Memory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_remembers_previous_message() {
    let fleet = Fleet::new();
    let service = fleet.service().await;

    let first = service
        .send_message(SendMessage::new("phone-1", "Hello"))
        .await
        .unwrap();
    assert!(!first.context_used);

    let second = service
        .send_message(SendMessage::new("phone-1", "Do you remember what I said?"))
        .await
        .unwrap();
    assert!(second.context_used);

    let backend = match second.model_used.as_str() {
        "llama" => &fleet.llama,
        "phi" => &fleet.phi,
        other => panic!("unexpected model {other}"),
    };
    let context = backend.last_request().context;
    assert!(
        context
            .iter()
            .any(|t| t.role == Role::User && t.content == "Hello")
    );
    assert!(context.iter().all(|t| !t.linked));
}

#[tokio::test]
async fn e2e_devices_are_isolated_until_linked() {
    let fleet = Fleet::new();
    let service = fleet.service().await;
    let phone = DeviceId::new("phone-1");
    let laptop = DeviceId::new("laptop-1");

    service
        .send_message(SendMessage::new("laptop-1", "my cat is called Miso"))
        .await
        .unwrap();

    let reply = service
        .send_message(SendMessage::new("phone-1", "what is my cat called?"))
        .await
        .unwrap();
    assert!(!reply.context_used);

    assert!(service.link_devices(&phone, &laptop).await.unwrap());
    let reply = service
        .send_message(SendMessage::new("phone-1", "what is my cat called?"))
        .await
        .unwrap();
    assert!(reply.context_used);

    let context = fleet.llama.last_request().context;
    assert!(
        context
            .iter()
            .any(|t| t.linked && t.origin_device == laptop && t.content.contains("Miso"))
    );
}

#[tokio::test]
async fn e2e_linking_is_symmetric_and_unlinking_immediate() {
    let fleet = Fleet::new();
    let service = ChatService::builder(Fleet::descriptors(), fleet.backends())
        .generic_model("llama")
        .build()
        .await
        .unwrap();
    let a = DeviceId::new("a");
    let b = DeviceId::new("b");

    // general requests all land on llama, the top-ranked general model
    service
        .send_message(SendMessage::new("a", "explain the note from a"))
        .await
        .unwrap();
    service
        .send_message(SendMessage::new("b", "explain the note from b"))
        .await
        .unwrap();

    service.link_devices(&b, &a).await.unwrap();
    for (device, other) in [(&a, &b), (&b, &a)] {
        service
            .send_message(SendMessage::new(device.as_str(), "explain again"))
            .await
            .unwrap();
        let context = fleet.llama.last_request().context;
        assert!(context.iter().any(|t| &t.origin_device == other));
    }

    assert!(service.unlink_devices(&a, &b).await.unwrap());
    for (device, other) in [(&a, &b), (&b, &a)] {
        service
            .send_message(SendMessage::new(device.as_str(), "explain once more"))
            .await
            .unwrap();
        let context = fleet.llama.last_request().context;
        assert!(context.iter().all(|t| &t.origin_device != other));
    }
}

#[tokio::test]
async fn e2e_context_stays_within_window() {
    let fleet = Fleet::new();
    let window = ContextWindow {
        max_turns: 4,
        max_chars: 120,
    };
    let service = ChatService::builder(Fleet::descriptors(), fleet.backends())
        .generic_model("llama")
        .window(window)
        .build()
        .await
        .unwrap();

    let devices = ["d1", "d2", "d3"];
    service
        .link_devices(&DeviceId::new("d1"), &DeviceId::new("d2"))
        .await
        .unwrap();
    service
        .link_devices(&DeviceId::new("d2"), &DeviceId::new("d3"))
        .await
        .unwrap();

    for round in 0..6 {
        for device in devices {
            service
                .send_message(SendMessage::new(
                    device,
                    format!("explain point {round} from {device} in some detail"),
                ))
                .await
                .unwrap();
            let context = fleet.llama.last_request().context;
            assert!(context.len() <= window.max_turns);
            let chars: usize = context.iter().map(|t| t.content.chars().count()).sum();
            assert!(chars <= window.max_chars);
            assert!(context.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }
}

// ── Classification & routing ─────────────────────────────────────────────

#[test]
fn e2e_classifier_scenarios() {
    assert_eq!(classify("write a function to sort a list"), TaskCategory::Coding);
    assert!(matches!(
        classify("hello"),
        TaskCategory::Simple | TaskCategory::General
    ));
}

#[tokio::test]
async fn e2e_coding_goes_to_coder_and_greeting_to_small_model() {
    let fleet = Fleet::new();
    let service = fleet.service().await;

    let reply = service
        .send_message(SendMessage::new("phone-1", "write a function to sort a list"))
        .await
        .unwrap();
    assert_eq!(reply.model_used, "coder");
    assert_eq!(reply.category, Some(TaskCategory::Coding));
    assert_eq!(reply.reason_code, ReasonCode::CategoryMatch);

    let reply = service
        .send_message(SendMessage::new("phone-1", "hello"))
        .await
        .unwrap();
    assert_ne!(reply.model_used, "coder");
}

#[tokio::test]
async fn e2e_unavailable_model_is_skipped_then_recovers() {
    let fleet = Fleet::new();
    let service = fleet.service().await;
    let coding = "write a function to parse json";

    service
        .registry()
        .set_availability("coder", Availability::Unavailable);
    let reply = service
        .send_message(SendMessage::new("phone-1", coding))
        .await
        .unwrap();
    assert_eq!(reply.model_used, "llama");
    assert_eq!(fleet.coder.calls(), 0);

    let report = service.health_probe(Duration::from_secs(30)).sweep().await;
    assert!(report.healthy.contains(&"coder".to_string()));

    let reply = service
        .send_message(SendMessage::new("phone-1", coding))
        .await
        .unwrap();
    assert_eq!(reply.model_used, "coder");
}

#[tokio::test(start_paused = true)]
async fn e2e_failed_model_cools_down_before_probe_restores_it() {
    let fleet = Fleet::new();
    let service = ChatService::builder(Fleet::descriptors(), fleet.backends())
        .generic_model("llama")
        .invoker(settings())
        .build()
        .await
        .unwrap();
    let coding = "fix this rust compile error";

    fleet.coder.set_down(true);
    let reply = service
        .send_message(SendMessage::new("phone-1", coding))
        .await
        .unwrap();
    assert_eq!(reply.model_used, "llama");
    assert_eq!(reply.attempts, 2);
    assert_eq!(
        service.registry().get("coder").unwrap().availability,
        Availability::Degraded
    );

    // the backend is back, but the cool-down still holds
    fleet.coder.set_down(false);
    let probe = service.health_probe(Duration::from_secs(30));
    let report = probe.sweep().await;
    assert_eq!(report.skipped, vec!["coder".to_string()]);

    let reply = service
        .send_message(SendMessage::new("phone-1", coding))
        .await
        .unwrap();
    assert_eq!(reply.model_used, "llama");
    assert_eq!(fleet.coder.calls(), 1);

    tokio::time::advance(Duration::from_secs(121)).await;
    let report = probe.sweep().await;
    assert!(report.healthy.contains(&"coder".to_string()));

    let reply = service
        .send_message(SendMessage::new("phone-1", coding))
        .await
        .unwrap();
    assert_eq!(reply.model_used, "coder");
}

#[tokio::test]
async fn e2e_every_model_down_is_reported_and_nothing_is_stored() {
    let fleet = Fleet::new();
    let service = ChatService::builder(Fleet::descriptors(), fleet.backends())
        .generic_model("llama")
        .invoker(settings())
        .build()
        .await
        .unwrap();
    fleet.coder.set_down(true);
    fleet.llama.set_down(true);
    fleet.phi.set_down(true);

    let err = service
        .send_message(SendMessage::new("phone-1", "write a sql query"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Routing(RoutingError::AllModelsFailed { .. })
    ));
    assert_eq!(err.retry_after_secs(), Some(30));

    let stored = service
        .read_memory(&DeviceId::new("phone-1"), 10)
        .await
        .unwrap();
    assert!(stored.is_empty());
    assert_eq!(
        service.audit().entries_by_outcome(AuditOutcome::Exhausted).len(),
        1
    );
}

#[tokio::test]
async fn e2e_router_is_deterministic_across_requests() {
    let fleet = Fleet::new();
    let service = fleet.service().await;

    let mut chosen = Vec::new();
    for _ in 0..5 {
        let reply = service
            .send_message(SendMessage::new("phone-1", "compare these two approaches"))
            .await
            .unwrap();
        chosen.push(reply.model_used);
    }
    assert!(chosen.windows(2).all(|w| w[0] == w[1]));
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_file_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let phone = DeviceId::new("phone-1");
    let laptop = DeviceId::new("laptop-1");

    {
        let fleet = Fleet::new();
        let kv: Arc<dyn KvStore> = Arc::new(FileKv::new(dir.path()).unwrap());
        let service = ChatService::builder(Fleet::descriptors(), fleet.backends())
            .kv(kv)
            .generic_model("llama")
            .build()
            .await
            .unwrap();
        service
            .send_message(SendMessage::new("phone-1", "Hello"))
            .await
            .unwrap();
        service.link_devices(&phone, &laptop).await.unwrap();
        fleet.phi.set_down(true);
        let report = service.health_probe(Duration::from_secs(30)).sweep().await;
        assert_eq!(report.unavailable, vec!["phi".to_string()]);
    }

    // phi answers again, but until a probe says so the saved state stands
    let fleet = Fleet::new();
    let kv: Arc<dyn KvStore> = Arc::new(FileKv::new(dir.path()).unwrap());
    let service = ChatService::builder(Fleet::descriptors(), fleet.backends())
        .kv(kv)
        .generic_model("llama")
        .build()
        .await
        .unwrap();
    assert_eq!(
        service.registry().get("phi").unwrap().availability,
        Availability::Unavailable
    );

    let stored = service.read_memory(&phone, 10).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].content, "Hello");
    assert_eq!(service.linked_devices(&laptop), vec![phone.clone()]);

    let reply = service
        .send_message(SendMessage::new("laptop-1", "Do you remember what I said?"))
        .await
        .unwrap();
    assert!(reply.context_used);
}
