//! Ekspose controller core
//!
//! The controller watches `Deployment` resources and, for each one, creates a `Service` that
//! selects the deployment's pods and an `Ingress` that routes `/<name>` to that service. When a
//! deployment is removed, its `Service` is deleted.
//!
//! ```text
//! [ Deployment index ] -> [ WorkQueue ] -> [ Reconciler ] -> [ SyncEngine ] -> [ ClusterApi ]
//! ```
//!
//! Everything in this crate is independent of the Kubernetes client: the API server is reached
//! through the [`ClusterApi`] trait and the local deployment cache through [`WorkloadCache`].

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod exposure;
mod key;
pub mod queue;
mod sync;
mod worker;

#[cfg(test)]
mod tests;

pub use self::{
    exposure::{ExposureSpec, IngressSpec, PathType, ServicePort, ServiceSpec},
    key::{KeyError, WorkItem},
    queue::WorkQueue,
    sync::{SyncEngine, SyncError},
    worker::{ReconcileMetrics, Reconciler},
};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

/// The name used as a field manager for all writes and as the name of the work queue.
pub const CONTROLLER_NAME: &str = "ekspose";

/// A read-only view of a `Deployment` at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadSnapshot {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Errors returned by [`ClusterApi`] calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,

    #[error("resource already exists")]
    AlreadyExists,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Calls against the cluster's API server.
#[async_trait::async_trait]
pub trait ClusterApi {
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<WorkloadSnapshot, ApiError>;

    async fn create_service(&self, spec: &ServiceSpec) -> Result<ServiceSpec, ApiError>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<ServiceSpec, ApiError>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ApiError>;

    async fn create_ingress(&self, spec: &IngressSpec) -> Result<IngressSpec, ApiError>;

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<IngressSpec, ApiError>;
}

/// A locally synchronized, eventually-consistent view of the cluster's deployments.
pub trait WorkloadCache {
    fn get(&self, namespace: &str, name: &str) -> Option<WorkloadSnapshot>;

    /// Returns true once the cache has observed a complete listing of deployments.
    fn has_synced(&self) -> bool;
}

impl<C: WorkloadCache> WorkloadCache for Arc<RwLock<C>> {
    fn get(&self, namespace: &str, name: &str) -> Option<WorkloadSnapshot> {
        self.read().get(namespace, name)
    }

    fn has_synced(&self) -> bool {
        self.read().has_synced()
    }
}
