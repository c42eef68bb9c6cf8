use crate::{ApiError, ClusterApi, SyncEngine, WorkItem, WorkQueue, WorkloadCache};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::sync::Arc;
use tracing::{info_span, Instrument};

/// Drains the work queue, driving each workload's exposure objects toward the desired state.
///
/// Several reconcilers may share a queue; the queue ensures that a key is only ever held by one
/// of them at a time.
#[derive(Debug)]
pub struct Reconciler<A, C> {
    queue: WorkQueue<WorkItem>,
    api: Arc<A>,
    engine: SyncEngine<A, C>,
    metrics: ReconcileMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    reconciles: Family<ReconcileLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReconcileLabels {
    action: &'static str,
    result: &'static str,
}

// === impl Reconciler ===

impl<A, C> Reconciler<A, C>
where
    A: ClusterApi + Send + Sync,
    C: WorkloadCache,
{
    pub fn new(
        queue: WorkQueue<WorkItem>,
        api: Arc<A>,
        cache: C,
        metrics: ReconcileMetrics,
    ) -> Self {
        let engine = SyncEngine::new(api.clone(), cache);
        Self {
            queue,
            api,
            engine,
            metrics,
        }
    }

    /// Processes items until the queue is shut down.
    pub async fn run(self) {
        while self.process_next().await {}
        tracing::debug!("Work queue shut down");
    }

    /// Processes a single item, returning false if the queue has been shut down.
    pub async fn process_next(&self) -> bool {
        let item = match self.queue.dequeue().await {
            Some(item) => item,
            None => return false,
        };

        let span = info_span!("reconcile", namespace = %item.namespace(), name = %item.name());
        self.reconcile(&item).instrument(span).await;
        self.queue.done(&item);
        true
    }

    async fn reconcile(&self, item: &WorkItem) {
        let (action, result) = match self.api.get_deployment(item.namespace(), item.name()).await
        {
            Ok(_) => ("sync", self.engine.apply(item).await),
            Err(ApiError::NotFound) => {
                tracing::debug!("Deployment not found");
                ("teardown", self.engine.teardown(item).await)
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to get Deployment");
                self.metrics.record("resolve", false);
                self.queue.requeue(item.clone());
                return;
            }
        };

        match result {
            Ok(()) => {
                self.metrics.record(action, true);
                self.queue.forget(item);
            }
            Err(error) => {
                let retries = self.queue.retries(item);
                tracing::error!(
                    error = &error as &(dyn std::error::Error + 'static),
                    retries,
                    "Failed to {action}"
                );
                self.metrics.record(action, false);
                self.queue.requeue(item.clone());
            }
        }
    }
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciles = Family::default();
        reg.register(
            "reconciles",
            "Count of reconciliations by action and result",
            reconciles.clone(),
        );
        Self { reconciles }
    }

    fn record(&self, action: &'static str, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.reconciles
            .get_or_create(&ReconcileLabels { action, result })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn count(&self, action: &'static str, result: &'static str) -> u64 {
        self.reconciles
            .get_or_create(&ReconcileLabels { action, result })
            .get()
    }
}
