
use crate::{
    ApiError, ClusterApi, IngressSpec, ServiceSpec, WorkItem, WorkloadCache, WorkloadSnapshot,
};
use ahash::AHashMap as HashMap;
use parking_lot::{Mutex, RwLock};
use std::{collections::BTreeMap, sync::Arc};
use tokio::time;

/// An in-memory API server.
#[derive(Debug, Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
    slow_gets: Option<time::Duration>,
}

#[derive(Debug, Default)]
struct State {
    deployments: BTreeMap<WorkItem, WorkloadSnapshot>,
    services: BTreeMap<WorkItem, ServiceSpec>,
    ingresses: BTreeMap<WorkItem, IngressSpec>,
    failures: HashMap<&'static str, usize>,
    calls: HashMap<&'static str, usize>,
    in_flight: Vec<WorkItem>,
    overlapped: bool,
}

/// A deployment cache that is updated explicitly by tests.
#[derive(Debug, Default)]
pub(crate) struct FakeCache {
    workloads: BTreeMap<WorkItem, WorkloadSnapshot>,
    synced: bool,
}

pub(crate) type SharedCache = Arc<RwLock<FakeCache>>;

pub(crate) fn key(ns: &str, name: &str) -> WorkItem {
    WorkItem::new(ns, name).expect("valid key")
}

pub(crate) fn mk_workload(ns: &str, name: &str, labels: &[(&str, &str)]) -> WorkloadSnapshot {
    WorkloadSnapshot {
        namespace: ns.to_string(),
        name: name.to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

// === impl FakeCluster ===

impl FakeCluster {
    pub(crate) fn with_slow_gets(delay: time::Duration) -> Self {
        Self {
            slow_gets: Some(delay),
            ..Default::default()
        }
    }

    pub(crate) fn add_deployment(&self, workload: WorkloadSnapshot) {
        let key = key(&workload.namespace, &workload.name);
        self.state.lock().deployments.insert(key, workload);
    }

    pub(crate) fn remove_deployment(&self, key: &WorkItem) {
        self.state.lock().deployments.remove(key);
    }

    pub(crate) fn insert_service(&self, spec: ServiceSpec) {
        let key = key(&spec.namespace, &spec.name);
        self.state.lock().services.insert(key, spec);
    }

    pub(crate) fn insert_ingress(&self, spec: IngressSpec) {
        let key = key(&spec.namespace, &spec.name);
        self.state.lock().ingresses.insert(key, spec);
    }

    pub(crate) fn services(&self) -> Vec<ServiceSpec> {
        self.state.lock().services.values().cloned().collect()
    }

    pub(crate) fn ingresses(&self) -> Vec<IngressSpec> {
        self.state.lock().ingresses.values().cloned().collect()
    }

    /// Causes the next `times` calls to `op` to fail with a transient error.
    pub(crate) fn fail_next(&self, op: &'static str, times: usize) {
        self.state.lock().failures.insert(op, times);
    }

    pub(crate) fn calls(&self, op: &'static str) -> usize {
        self.state.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub(crate) fn overlapped(&self) -> bool {
        self.state.lock().overlapped
    }

    fn call(&self, op: &'static str) -> Result<parking_lot::MutexGuard<'_, State>, ApiError> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_default() += 1;
        if let Some(remaining) = state.failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow::anyhow!("{op}: connection refused").into());
            }
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl ClusterApi for FakeCluster {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadSnapshot, ApiError> {
        let id = key(namespace, name);
        {
            let mut state = self.state.lock();
            if state.in_flight.contains(&id) {
                state.overlapped = true;
            }
            state.in_flight.push(id.clone());
        }
        if let Some(delay) = self.slow_gets {
            time::sleep(delay).await;
        }
        self.state.lock().in_flight.retain(|k| *k != id);

        let state = self.call("get_deployment")?;
        state.deployments.get(&id).cloned().ok_or(ApiError::NotFound)
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceSpec, ApiError> {
        let mut state = self.call("create_service")?;
        let id = key(&spec.namespace, &spec.name);
        if state.services.contains_key(&id) {
            return Err(ApiError::AlreadyExists);
        }
        state.services.insert(id, spec.clone());
        Ok(spec.clone())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<ServiceSpec, ApiError> {
        let state = self.call("get_service")?;
        state
            .services
            .get(&key(namespace, name))
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        let mut state = self.call("delete_service")?;
        state
            .services
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or(ApiError::NotFound)
    }

    async fn create_ingress(&self, spec: &IngressSpec) -> Result<IngressSpec, ApiError> {
        let mut state = self.call("create_ingress")?;
        let id = key(&spec.namespace, &spec.name);
        if state.ingresses.contains_key(&id) {
            return Err(ApiError::AlreadyExists);
        }
        state.ingresses.insert(id, spec.clone());
        Ok(spec.clone())
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<IngressSpec, ApiError> {
        let state = self.call("get_ingress")?;
        state
            .ingresses
            .get(&key(namespace, name))
            .cloned()
            .ok_or(ApiError::NotFound)
    }
}

// === impl FakeCache ===

impl FakeCache {
    pub(crate) fn shared() -> SharedCache {
        Arc::new(RwLock::new(Self {
            synced: true,
            ..Default::default()
        }))
    }

    pub(crate) fn insert(&mut self, workload: WorkloadSnapshot) {
        let key = key(&workload.namespace, &workload.name);
        self.workloads.insert(key, workload);
    }

    pub(crate) fn remove(&mut self, key: &WorkItem) {
        self.workloads.remove(key);
    }
}

impl WorkloadCache for FakeCache {
    fn get(&self, namespace: &str, name: &str) -> Option<WorkloadSnapshot> {
        self.workloads.get(&key(namespace, name)).cloned()
    }

    fn has_synced(&self) -> bool {
        self.synced
    }
}

/// Creates a deployment in both the fake API server and the cache.
pub(crate) fn deploy(api: &FakeCluster, cache: &SharedCache, workload: WorkloadSnapshot) {
    api.add_deployment(workload.clone());
    cache.write().insert(workload);
}

/// Removes a deployment from both the fake API server and the cache.
pub(crate) fn undeploy(api: &FakeCluster, cache: &SharedCache, key: &WorkItem) {
    api.remove_deployment(key);
    cache.write().remove(key);
}
