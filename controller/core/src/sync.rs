use crate::{
    exposure::{ExposureSpec, IngressSpec, ServiceSpec},
    ApiError, ClusterApi, WorkItem, WorkloadCache,
};
use std::sync::Arc;

/// Creates and removes the exposure objects for a single workload.
#[derive(Debug)]
pub struct SyncEngine<A, C> {
    api: Arc<A>,
    cache: C,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("deployment {0} not found in cache")]
    NotFoundInCache(WorkItem),

    #[error("{kind} {item} already exists with a different spec")]
    Conflict { kind: &'static str, item: WorkItem },

    #[error("failed to {action} {kind} {item}")]
    Api {
        action: &'static str,
        kind: &'static str,
        item: WorkItem,
        #[source]
        source: ApiError,
    },
}

// === impl SyncEngine ===

impl<A, C> SyncEngine<A, C>
where
    A: ClusterApi + Send + Sync,
    C: WorkloadCache,
{
    pub fn new(api: Arc<A>, cache: C) -> Self {
        Self { api, cache }
    }

    /// Ensures that a `Service` and an `Ingress` exist for the workload.
    ///
    /// The workload is read from the local cache. Objects that already exist with a matching
    /// spec are left untouched; a failure after the `Service` is created leaves it in place for
    /// the next attempt to find.
    pub async fn apply(&self, item: &WorkItem) -> Result<(), SyncError> {
        let workload = self
            .cache
            .get(item.namespace(), item.name())
            .ok_or_else(|| SyncError::NotFoundInCache(item.clone()))?;

        let ExposureSpec { service, ingress } = ExposureSpec::for_workload(&workload);
        self.ensure_service(item, &service).await?;
        self.ensure_ingress(item, &ingress).await?;
        Ok(())
    }

    /// Removes the workload's `Service`. A missing `Service` is not an error.
    ///
    /// The `Ingress` is left in place.
    pub async fn teardown(&self, item: &WorkItem) -> Result<(), SyncError> {
        match self
            .api
            .delete_service(item.namespace(), item.name())
            .await
        {
            Ok(()) => {
                tracing::info!("Deleted Service");
                Ok(())
            }
            Err(ApiError::NotFound) => {
                tracing::debug!("Service already deleted");
                Ok(())
            }
            Err(err) => Err(SyncError::api("delete", "Service", item, err)),
        }
    }

    async fn ensure_service(&self, item: &WorkItem, spec: &ServiceSpec) -> Result<(), SyncError> {
        let err = match self.api.create_service(spec).await {
            Ok(_) => {
                tracing::info!(selector = ?spec.selector, "Created Service");
                return Ok(());
            }
            Err(err) => err,
        };
        if !matches!(err, ApiError::AlreadyExists) {
            return Err(SyncError::api("create", "Service", item, err));
        }

        let existing = self
            .api
            .get_service(item.namespace(), item.name())
            .await
            .map_err(|err| SyncError::api("get", "Service", item, err))?;
        if !spec.matches(&existing) {
            return Err(SyncError::Conflict {
                kind: "Service",
                item: item.clone(),
            });
        }
        tracing::debug!("Service already exists");
        Ok(())
    }

    async fn ensure_ingress(&self, item: &WorkItem, spec: &IngressSpec) -> Result<(), SyncError> {
        let err = match self.api.create_ingress(spec).await {
            Ok(_) => {
                tracing::info!(path = %spec.path, "Created Ingress");
                return Ok(());
            }
            Err(err) => err,
        };
        if !matches!(err, ApiError::AlreadyExists) {
            return Err(SyncError::api("create", "Ingress", item, err));
        }

        let existing = self
            .api
            .get_ingress(item.namespace(), item.name())
            .await
            .map_err(|err| SyncError::api("get", "Ingress", item, err))?;
        if !spec.matches(&existing) {
            return Err(SyncError::Conflict {
                kind: "Ingress",
                item: item.clone(),
            });
        }
        tracing::debug!("Ingress already exists");
        Ok(())
    }
}

// === impl SyncError ===

impl SyncError {
    fn api(action: &'static str, kind: &'static str, item: &WorkItem, source: ApiError) -> Self {
        Self::Api {
            action,
            kind,
            item: item.clone(),
            source,
        }
    }
}
