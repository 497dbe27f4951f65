//! Model registry.
//!
//! Holds one [`ModelDescriptor`] per model. Availability is the only field
//! that changes after startup; the router always works from a cloned
//! snapshot so a concurrent health update never tears a routing decision.

use memoria_core::error::StorageError;
use memoria_core::model::{Availability, ModelDescriptor};
use memoria_core::store::KvStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Key prefix under which descriptors are persisted.
pub const MODELS_PREFIX: &str = "models/";

struct Entry {
    descriptor: ModelDescriptor,
    degraded_until: Option<Instant>,
}

/// Externally visible health of one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub available: bool,
    pub state: Availability,
    pub priority_rank: u32,
    pub tags: Vec<String>,
}

/// Catalog of known models with their current health.
pub struct ModelRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl ModelRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = ModelDescriptor>) -> Self {
        let entries = descriptors
            .into_iter()
            .map(|descriptor| {
                (
                    descriptor.id.clone(),
                    Entry {
                        descriptor,
                        degraded_until: None,
                    },
                )
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Snapshot of every descriptor, ordered by id.
    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        self.read()
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<ModelDescriptor> {
        self.read().get(id).map(|entry| entry.descriptor.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Set a model's availability. Returns `false` for unknown ids.
    ///
    /// Any pending cool-down is cleared.
    pub fn set_availability(&self, id: &str, availability: Availability) -> bool {
        let mut entries = self.write();
        let Some(entry) = entries.get_mut(id) else {
            warn!(model_id = id, "Availability update for unknown model");
            return false;
        };
        if entry.descriptor.availability != availability {
            info!(
                model_id = id,
                from = entry.descriptor.availability.as_str(),
                to = availability.as_str(),
                "Model availability changed"
            );
        }
        entry.descriptor.availability = availability;
        entry.degraded_until = None;
        true
    }

    /// Apply a health-check result unless the model entered a cool-down
    /// since the check started. Returns `false` when the result was dropped.
    pub fn refresh_availability(&self, id: &str, availability: Availability) -> bool {
        let mut entries = self.write();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        if entry.degraded_until.is_some_and(|until| Instant::now() < until) {
            debug!(model_id = id, "Model in cool-down, health result dropped");
            return false;
        }
        if entry.descriptor.availability != availability {
            info!(
                model_id = id,
                from = entry.descriptor.availability.as_str(),
                to = availability.as_str(),
                "Model availability changed"
            );
        }
        entry.descriptor.availability = availability;
        entry.degraded_until = None;
        true
    }

    /// Mark a model degraded for at least `cooldown`.
    ///
    /// The health probe leaves it alone until the cool-down has elapsed.
    pub fn mark_degraded(&self, id: &str, cooldown: Duration) -> bool {
        let mut entries = self.write();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        entry.descriptor.availability = Availability::Degraded;
        entry.degraded_until = Some(Instant::now() + cooldown);
        info!(model_id = id, cooldown_secs = cooldown.as_secs(), "Model marked degraded");
        true
    }

    /// Whether `id` is still inside a cool-down window.
    pub fn in_cooldown(&self, id: &str) -> bool {
        self.read()
            .get(id)
            .and_then(|entry| entry.degraded_until)
            .is_some_and(|until| Instant::now() < until)
    }

    /// Health summary for every model, keyed by id.
    pub fn status(&self) -> BTreeMap<String, ModelStatus> {
        self.read()
            .iter()
            .map(|(id, entry)| {
                let d = &entry.descriptor;
                (
                    id.clone(),
                    ModelStatus {
                        available: d.availability.is_healthy(),
                        state: d.availability,
                        priority_rank: d.priority_rank,
                        tags: d.capability_tags.iter().cloned().collect(),
                    },
                )
            })
            .collect()
    }

    /// Write every descriptor to `kv` under `models/<id>`.
    pub async fn persist(&self, kv: &dyn KvStore) -> Result<(), StorageError> {
        for descriptor in self.descriptors() {
            let key = format!("{MODELS_PREFIX}{}", descriptor.id);
            let record = serde_json::to_string(&descriptor).map_err(|e| StorageError::Corrupt {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            kv.replace(&key, vec![record]).await?;
        }
        debug!(backend = kv.name(), "Model registry persisted");
        Ok(())
    }

    /// Restore last-known availability for models that are still configured.
    ///
    /// Tags, cost and rank always come from configuration; only health is
    /// carried over. Returns how many models were restored.
    pub async fn restore(&self, kv: &dyn KvStore) -> Result<usize, StorageError> {
        let mut restored = 0;
        for key in kv.keys(MODELS_PREFIX).await? {
            let Some(record) = kv.get(&key).await?.pop() else {
                continue;
            };
            match serde_json::from_str::<ModelDescriptor>(&record) {
                Ok(saved) => {
                    let mut entries = self.write();
                    if let Some(entry) = entries.get_mut(&saved.id) {
                        entry.descriptor.availability = saved.availability;
                        restored += 1;
                    }
                }
                Err(e) => warn!(key = %key, error = %e, "Skipping corrupted model record"),
            }
        }
        Ok(restored)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_memory::InMemoryKv;

    fn registry() -> ModelRegistry {
        ModelRegistry::new([
            ModelDescriptor::new("b", ["general"], 2),
            ModelDescriptor::new("a", ["coding"], 1),
        ])
    }

    #[test]
    fn descriptors_are_sorted_by_id() {
        let ids: Vec<_> = registry().descriptors().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn set_availability_unknown_model() {
        assert!(!registry().set_availability("zzz", Availability::Unavailable));
    }

    #[test]
    fn snapshot_is_isolated_from_updates() {
        let registry = registry();
        let snapshot = registry.descriptors();
        registry.set_availability("a", Availability::Unavailable);
        assert_eq!(snapshot[0].availability, Availability::Healthy);
        assert_eq!(registry.get("a").unwrap().availability, Availability::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_expires() {
        let registry = registry();
        registry.mark_degraded("a", Duration::from_secs(120));
        assert!(registry.in_cooldown("a"));
        assert_eq!(registry.get("a").unwrap().availability, Availability::Degraded);

        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(!registry.in_cooldown("a"));
        // still degraded until something re-checks it
        assert_eq!(registry.get("a").unwrap().availability, Availability::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_leaves_cooldown_alone() {
        let registry = registry();
        registry.mark_degraded("a", Duration::from_secs(60));
        assert!(!registry.refresh_availability("a", Availability::Healthy));
        assert_eq!(registry.get("a").unwrap().availability, Availability::Degraded);
        assert!(registry.in_cooldown("a"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(registry.refresh_availability("a", Availability::Healthy));
        assert_eq!(registry.get("a").unwrap().availability, Availability::Healthy);
    }

    #[test]
    fn status_reports_availability() {
        let registry = registry();
        registry.set_availability("b", Availability::Unavailable);
        let status = registry.status();
        assert!(status["a"].available);
        assert!(!status["b"].available);
        assert_eq!(status["b"].state, Availability::Unavailable);
    }

    #[tokio::test]
    async fn persist_and_restore_availability() {
        let kv = InMemoryKv::new();
        let registry = registry();
        registry.set_availability("a", Availability::Unavailable);
        registry.persist(&kv).await.unwrap();
        assert_eq!(kv.keys(MODELS_PREFIX).await.unwrap(), vec!["models/a", "models/b"]);

        let fresh = self::registry();
        assert_eq!(fresh.restore(&kv).await.unwrap(), 2);
        assert_eq!(fresh.get("a").unwrap().availability, Availability::Unavailable);
        assert_eq!(fresh.get("b").unwrap().availability, Availability::Healthy);
    }
}
