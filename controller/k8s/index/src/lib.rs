//! Deployment index
//!
//! The index holds a snapshot of every `Deployment` in the cluster, as observed by a watch, and
//! translates watch events into work items:
//!
//! - a deployment that was not previously indexed is enqueued;
//! - a deployment that is removed from the index is enqueued;
//! - updates to an already-indexed deployment only refresh its snapshot.
//!
//! Reconcilers read snapshots back from the index through [`WorkloadCache`]. The index reports
//! itself synced once the watch has delivered its first complete listing.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod metrics;


pub use self::metrics::IndexMetrics;
use ahash::AHashMap as HashMap;
use ekspose_controller_core::{WorkItem, WorkQueue, WorkloadCache, WorkloadSnapshot};
use ekspose_controller_k8s_api::{exposure, Deployment, ResourceExt};
use kubert::index::NamespacedRemoved;
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, sync::Arc};
use tokio::sync::watch;

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Debug)]
pub struct Index {
    namespaces: HashMap<String, HashMap<String, WorkloadSnapshot>>,
    queue: WorkQueue<WorkItem>,
    synced: watch::Sender<bool>,
    metrics: IndexMetrics,
}

// === impl Index ===

impl Index {
    pub fn shared(queue: WorkQueue<WorkItem>, metrics: IndexMetrics) -> SharedIndex {
        let (synced, _) = watch::channel(false);
        Arc::new(RwLock::new(Self {
            namespaces: HashMap::new(),
            queue,
            synced,
            metrics,
        }))
    }

    /// Returns a receiver that is updated to `true` once the index has synced.
    pub fn synced_rx(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }

    /// Returns the number of indexed deployments.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(|ns| ns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores the deployment, returning its key if it was not already indexed.
    fn insert(&mut self, deployment: &Deployment) -> Option<WorkItem> {
        let key = WorkItem::from_meta(
            deployment.metadata.namespace.as_deref(),
            deployment.metadata.name.as_deref(),
        );
        let key = match key {
            Ok(key) => key,
            Err(error) => {
                tracing::error!(%error, "Dropping malformed Deployment key");
                return None;
            }
        };
        let snapshot = match exposure::workload(deployment) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::error!(%error, %key, "Dropping invalid Deployment");
                return None;
            }
        };

        let ns = self
            .namespaces
            .entry(key.namespace().to_string())
            .or_default();
        let added = ns.insert(key.name().to_string(), snapshot).is_none();
        self.metrics.set_size(key.namespace(), ns.len());
        added.then_some(key)
    }

    /// Forgets the deployment, returning its key.
    fn remove(&mut self, namespace: String, name: String) -> Option<WorkItem> {
        if let Entry::Occupied(mut ns) = self.namespaces.entry(namespace.clone()) {
            ns.get_mut().remove(&name);
            self.metrics.set_size(&namespace, ns.get().len());
            if ns.get().is_empty() {
                ns.remove();
            }
        }

        match WorkItem::new(namespace, name) {
            Ok(key) => Some(key),
            Err(error) => {
                tracing::error!(%error, "Dropping malformed Deployment key");
                None
            }
        }
    }

    fn mark_synced(&mut self) {
        if !*self.synced.borrow() {
            tracing::info!(deployments = self.len(), "Deployment cache synced");
            self.synced.send_replace(true);
        }
    }
}

impl WorkloadCache for Index {
    fn get(&self, namespace: &str, name: &str) -> Option<WorkloadSnapshot> {
        self.namespaces.get(namespace)?.get(name).cloned()
    }

    fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }
}

impl kubert::index::IndexNamespacedResource<Deployment> for Index {
    fn apply(&mut self, deployment: Deployment) {
        let namespace = deployment.namespace().unwrap_or_default();
        self.metrics.inc_applies(&namespace);

        if let Some(key) = self.insert(&deployment) {
            tracing::debug!(%key, "Deployment added");
            self.queue.enqueue(key);
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.metrics.inc_deletes(&namespace);

        if let Some(key) = self.remove(namespace, name) {
            tracing::debug!(%key, "Deployment deleted");
            self.queue.enqueue(key);
        }
    }

    fn reset(&mut self, deployments: Vec<Deployment>, removed: NamespacedRemoved) {
        self.metrics.inc_resets();

        for deployment in deployments.into_iter() {
            self.apply(deployment);
        }
        for (namespace, names) in removed.into_iter() {
            for name in names.into_iter() {
                self.delete(namespace.clone(), name);
            }
        }

        self.mark_synced();
    }
}
