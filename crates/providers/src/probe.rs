//! Health probe: periodically re-checks every model and updates the registry.
//!
//! Models inside a cool-down (set by the invoker after a failure) are
//! skipped until it elapses. Everything else is checked concurrently; a
//! check that errors or exceeds the deadline marks the model unavailable.

use futures::future::join_all;
use memoria_core::model::Availability;
use memoria_core::store::KvStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backends::BackendSet;
use crate::registry::ModelRegistry;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub healthy: Vec<String>,
    pub unavailable: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct HealthProbe {
    registry: Arc<ModelRegistry>,
    backends: Arc<BackendSet>,
    interval: Duration,
    check_timeout: Duration,
    kv: Option<Arc<dyn KvStore>>,
}

impl HealthProbe {
    pub fn new(registry: Arc<ModelRegistry>, backends: Arc<BackendSet>, interval: Duration) -> Self {
        Self {
            registry,
            backends,
            interval,
            check_timeout: Duration::from_secs(5),
            kv: None,
        }
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Persist the registry after each sweep.
    pub fn with_store(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Check every model once.
    pub async fn sweep(&self) -> ProbeReport {
        let mut report = ProbeReport::default();
        let mut due = Vec::new();

        for descriptor in self.registry.descriptors() {
            if self.registry.in_cooldown(&descriptor.id) {
                report.skipped.push(descriptor.id);
            } else {
                due.push(descriptor.id);
            }
        }

        let checks = due.into_iter().map(|id| async move {
            let healthy = match self.backends.get(&id) {
                Some(backend) => {
                    match tokio::time::timeout(self.check_timeout, backend.health_check()).await {
                        Ok(Ok(ok)) => ok,
                        Ok(Err(e)) => {
                            debug!(model_id = %id, error = %e, "Health check failed");
                            false
                        }
                        Err(_) => {
                            debug!(model_id = %id, "Health check timed out");
                            false
                        }
                    }
                }
                None => false,
            };
            (id, healthy)
        });

        for (id, healthy) in join_all(checks).await {
            let availability = if healthy {
                Availability::Healthy
            } else {
                Availability::Unavailable
            };
            // The invoker may have started a cool-down while the check ran.
            if !self.registry.refresh_availability(&id, availability) {
                report.skipped.push(id);
            } else if healthy {
                report.healthy.push(id);
            } else {
                report.unavailable.push(id);
            }
        }

        if let Some(kv) = &self.kv
            && let Err(e) = self.registry.persist(kv.as_ref()).await
        {
            warn!(error = %e, "Failed to persist model registry");
        }

        debug!(
            healthy = report.healthy.len(),
            unavailable = report.unavailable.len(),
            skipped = report.skipped.len(),
            "Health sweep complete"
        );
        report
    }

    /// Run sweeps forever on the configured interval. The first sweep runs
    /// immediately.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        info!(interval_secs = self.interval.as_secs(), "Health probe started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                self.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memoria_core::backend::{GenerateRequest, ModelBackend};
    use memoria_core::error::ModelError;
    use memoria_core::model::ModelDescriptor;
    use memoria_memory::InMemoryKv;

    struct Fixed {
        id: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl ModelBackend for Fixed {
        fn id(&self) -> &str {
            self.id
        }
        async fn generate(&self, _: GenerateRequest) -> Result<String, ModelError> {
            Ok(String::new())
        }
        async fn health_check(&self) -> Result<bool, ModelError> {
            Ok(self.healthy)
        }
    }

    fn setup() -> (Arc<ModelRegistry>, Arc<BackendSet>) {
        let registry = Arc::new(ModelRegistry::new([
            ModelDescriptor::new("up", ["general"], 1),
            ModelDescriptor::new("down", ["general"], 2),
            ModelDescriptor::new("orphan", ["general"], 3),
        ]));
        let backends = Arc::new(
            BackendSet::new()
                .with(Arc::new(Fixed { id: "up", healthy: true }))
                .with(Arc::new(Fixed { id: "down", healthy: false })),
        );
        (registry, backends)
    }

    #[tokio::test]
    async fn sweep_updates_registry() {
        let (registry, backends) = setup();
        let probe = HealthProbe::new(registry.clone(), backends, Duration::from_secs(30));
        let report = probe.sweep().await;

        assert_eq!(report.healthy, vec!["up"]);
        assert_eq!(report.unavailable, vec!["down", "orphan"]);
        assert_eq!(registry.get("down").unwrap().availability, Availability::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_models_are_skipped_until_expiry() {
        let (registry, backends) = setup();
        registry.mark_degraded("up", Duration::from_secs(120));
        let probe = HealthProbe::new(registry.clone(), backends, Duration::from_secs(30));

        let report = probe.sweep().await;
        assert_eq!(report.skipped, vec!["up"]);
        assert_eq!(registry.get("up").unwrap().availability, Availability::Degraded);

        tokio::time::advance(Duration::from_secs(121)).await;
        let report = probe.sweep().await;
        assert!(report.skipped.is_empty());
        assert_eq!(registry.get("up").unwrap().availability, Availability::Healthy);
    }

    struct Stalling {
        delay: Duration,
    }

    #[async_trait]
    impl ModelBackend for Stalling {
        fn id(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _: GenerateRequest) -> Result<String, ModelError> {
            Ok(String::new())
        }
        async fn health_check(&self) -> Result<bool, ModelError> {
            tokio::time::sleep(self.delay).await;
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_started_mid_sweep_survives() {
        let registry = Arc::new(ModelRegistry::new([ModelDescriptor::new("slow", ["general"], 1)]));
        let backends = Arc::new(BackendSet::new().with(Arc::new(Stalling {
            delay: Duration::from_secs(2),
        })));
        let probe = HealthProbe::new(registry.clone(), backends, Duration::from_secs(30));

        let sweep = tokio::spawn(async move { probe.sweep().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        registry.mark_degraded("slow", Duration::from_secs(120));

        let report = sweep.await.unwrap();
        assert_eq!(report.skipped, vec!["slow"]);
        assert!(report.healthy.is_empty());
        assert_eq!(registry.get("slow").unwrap().availability, Availability::Degraded);
        assert!(registry.in_cooldown("slow"));
    }

    #[tokio::test]
    async fn sweep_persists_when_backed() {
        let (registry, backends) = setup();
        let kv = Arc::new(InMemoryKv::new());
        let probe = HealthProbe::new(registry, backends, Duration::from_secs(30)).with_store(kv.clone());
        probe.sweep().await;
        assert_eq!(kv.keys("models/").await.unwrap().len(), 3);
    }
}
