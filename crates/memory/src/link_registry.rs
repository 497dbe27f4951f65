//! Link registry: the symmetric device-pairing graph.
//!
//! Readers take an `Arc` clone of the current immutable [`LinkGraph`] and
//! never wait on writers. Mutations are serialized through one coarse async
//! lock, build a new graph, persist it, and only then swap it in, so a
//! failed write leaves the visible graph unchanged.
//!
//! The whole pair table lives under the single key `links`.

use memoria_core::error::StorageError;
use memoria_core::link::Link;
use memoria_core::store::KvStore;
use memoria_core::turn::DeviceId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::retry::retry_once;

const LINKS_KEY: &str = "links";

/// An immutable snapshot of all links.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    links: BTreeMap<(DeviceId, DeviceId), Link>,
}

impl LinkGraph {
    fn from_links(links: impl IntoIterator<Item = Link>) -> Self {
        Self {
            links: links.into_iter().map(|l| (l.key(), l)).collect(),
        }
    }

    /// Whether `a` and `b` are linked (in either order).
    pub fn contains(&self, a: &DeviceId, b: &DeviceId) -> bool {
        self.links.contains_key(&Link::canonical(a.clone(), b.clone()))
    }

    /// Devices linked to `device`.
    pub fn neighbors(&self, device: &DeviceId) -> BTreeSet<DeviceId> {
        self.links
            .values()
            .filter_map(|link| link.other(device).cloned())
            .collect()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// The service object guarding the link graph.
pub struct LinkRegistry {
    snapshot: RwLock<Arc<LinkGraph>>,
    write_lock: tokio::sync::Mutex<()>,
    kv: Option<Arc<dyn KvStore>>,
}

impl LinkRegistry {
    /// A registry with no persistence.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(LinkGraph::default())),
            write_lock: tokio::sync::Mutex::new(()),
            kv: None,
        }
    }

    /// A registry persisted through `kv`, loaded from its current contents.
    pub async fn open(kv: Arc<dyn KvStore>) -> Result<Self, StorageError> {
        let records = retry_once(LINKS_KEY, || kv.get(LINKS_KEY)).await?;
        let links = records.iter().filter_map(|line| match serde_json::from_str::<Link>(line) {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(error = %e, "Skipping corrupted link record");
                None
            }
        });
        let graph = LinkGraph::from_links(links);
        info!(links = graph.len(), backend = kv.name(), "Link registry loaded");

        Ok(Self {
            snapshot: RwLock::new(Arc::new(graph)),
            write_lock: tokio::sync::Mutex::new(()),
            kv: Some(kv),
        })
    }

    /// The current graph. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<LinkGraph> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Devices currently linked to `device`.
    pub fn neighbors(&self, device: &DeviceId) -> BTreeSet<DeviceId> {
        self.snapshot().neighbors(device)
    }

    /// Link two devices. Idempotent; returns `true` if a new link was created.
    ///
    /// Linking a device to itself is a no-op.
    pub async fn link(&self, a: &DeviceId, b: &DeviceId) -> Result<bool, StorageError> {
        if a == b {
            debug!(device_id = %a, "Ignoring self-link");
            return Ok(false);
        }

        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        if current.contains(a, b) {
            return Ok(false);
        }

        let mut next = (*current).clone();
        let link = Link::new(a.clone(), b.clone());
        next.links.insert(link.key(), link);
        self.commit(next).await?;

        info!(device_a = %a, device_b = %b, "Devices linked");
        Ok(true)
    }

    /// Remove a link. Removing a link that does not exist is a no-op;
    /// returns `true` if a link was removed.
    pub async fn unlink(&self, a: &DeviceId, b: &DeviceId) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        if !current.contains(a, b) {
            debug!(device_a = %a, device_b = %b, "Unlink of missing pair ignored");
            return Ok(false);
        }

        let mut next = (*current).clone();
        next.links.remove(&Link::canonical(a.clone(), b.clone()));
        self.commit(next).await?;

        info!(device_a = %a, device_b = %b, "Devices unlinked");
        Ok(true)
    }

    /// Persist `next` (if backed) and publish it. Caller holds `write_lock`.
    async fn commit(&self, next: LinkGraph) -> Result<(), StorageError> {
        if let Some(kv) = &self.kv {
            let records = next
                .links()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Corrupt {
                    key: LINKS_KEY.into(),
                    reason: e.to_string(),
                })?;
            retry_once(LINKS_KEY, || kv.replace(LINKS_KEY, records.clone())).await?;
        }

        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
        Ok(())
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryKv;

    fn d(id: &str) -> DeviceId {
        DeviceId::from(id)
    }

    #[tokio::test]
    async fn link_is_symmetric() {
        let registry = LinkRegistry::new();
        assert!(registry.link(&d("phone-1"), &d("laptop-1")).await.unwrap());

        assert!(registry.neighbors(&d("phone-1")).contains(&d("laptop-1")));
        assert!(registry.neighbors(&d("laptop-1")).contains(&d("phone-1")));
    }

    #[tokio::test]
    async fn link_is_idempotent() {
        let registry = LinkRegistry::new();
        assert!(registry.link(&d("a"), &d("b")).await.unwrap());
        assert!(!registry.link(&d("a"), &d("b")).await.unwrap());
        assert!(!registry.link(&d("b"), &d("a")).await.unwrap());
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn unlink_missing_is_noop() {
        let registry = LinkRegistry::new();
        assert!(!registry.unlink(&d("a"), &d("b")).await.unwrap());
    }

    #[tokio::test]
    async fn unlink_takes_effect_immediately() {
        let registry = LinkRegistry::new();
        registry.link(&d("a"), &d("b")).await.unwrap();
        assert!(registry.unlink(&d("b"), &d("a")).await.unwrap());
        assert!(registry.neighbors(&d("a")).is_empty());
        assert!(registry.neighbors(&d("b")).is_empty());
    }

    #[tokio::test]
    async fn self_link_ignored() {
        let registry = LinkRegistry::new();
        assert!(!registry.link(&d("a"), &d("a")).await.unwrap());
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn old_snapshot_is_unaffected_by_later_writes() {
        let registry = LinkRegistry::new();
        let before = registry.snapshot();
        registry.link(&d("a"), &d("b")).await.unwrap();
        assert!(before.is_empty());
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn links_persist_through_kv() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
        let registry = LinkRegistry::open(kv.clone()).await.unwrap();
        registry.link(&d("a"), &d("b")).await.unwrap();
        registry.link(&d("a"), &d("c")).await.unwrap();
        registry.unlink(&d("a"), &d("b")).await.unwrap();

        let reopened = LinkRegistry::open(kv).await.unwrap();
        assert_eq!(reopened.neighbors(&d("a")), BTreeSet::from([d("c")]));
        assert!(reopened.neighbors(&d("b")).is_empty());
    }
}
