use crate::{
    core::{
        queue::{QueueMetrics, RateLimiter},
        ReconcileMetrics, Reconciler, WorkQueue,
    },
    index::{Index, IndexMetrics},
    k8s::{self, KubeCluster},
};
use anyhow::{anyhow, bail, Result};
use clap::Parser;
use futures::future;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{num::NonZeroUsize, sync::Arc};
use tokio::time::{self, Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "ekspose",
    about = "Exposes Deployments through a Service and an Ingress"
)]
pub struct Args {
    #[clap(long, default_value = "ekspose=info,warn", env = "EKSPOSE_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Number of workers reconciling deployments concurrently.
    #[clap(long, default_value = "1")]
    workers: NonZeroUsize,

    /// How long to wait for the initial Deployment listing before giving up.
    #[clap(long, default_value = "60")]
    cache_sync_timeout_secs: u64,

    /// Delay before the first retry of a failed item. Doubles on each failure.
    #[clap(long, default_value = "5")]
    retry_base_delay_ms: u64,

    #[clap(long, default_value = "1000")]
    retry_max_delay_secs: u64,

    /// Overall rate of retries. Zero disables the limit.
    #[clap(long, default_value = "10")]
    queue_qps: f64,

    #[clap(long, default_value = "100")]
    queue_burst: u32,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            workers,
            cache_sync_timeout_secs,
            retry_base_delay_ms,
            retry_max_delay_secs,
            queue_qps,
            queue_burst,
        } = self;

        let mut prom = <Registry>::default();
        let queue_metrics = QueueMetrics::register(prom.sub_registry_with_prefix("workqueue"));
        let reconcile_metrics =
            ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));
        let index_metrics =
            IndexMetrics::register(prom.sub_registry_with_prefix("deployment_index"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let limiter = RateLimiter::new(
            Duration::from_millis(retry_base_delay_ms),
            Duration::from_secs(retry_max_delay_secs),
            queue_qps,
            queue_burst,
        );
        let queue = WorkQueue::new(limiter, queue_metrics);

        // The index feeds the queue as deployments are added and removed.
        let index = Index::shared(queue.clone(), index_metrics);
        let mut synced = index.read().synced_rx();

        let deployments = runtime.watch_all::<k8s::Deployment>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), deployments)
                .instrument(info_span!("deployments")),
        );

        // Workers must not observe a partially populated cache.
        info!("Waiting for Deployment cache to sync");
        time::timeout(
            Duration::from_secs(cache_sync_timeout_secs),
            synced.wait_for(|synced| *synced),
        )
        .await
        .map_err(|_| anyhow!("timed out waiting for the Deployment cache to sync"))?
        .map_err(|_| anyhow!("Deployment index closed before syncing"))?;

        let cluster = Arc::new(KubeCluster::new(runtime.client()));
        let tasks = (0..workers.get())
            .map(|id| {
                let reconciler = Reconciler::new(
                    queue.clone(),
                    cluster.clone(),
                    index.clone(),
                    reconcile_metrics.clone(),
                );
                tokio::spawn(reconciler.run().instrument(info_span!("worker", id)))
            })
            .collect::<Vec<_>>();
        info!(workers = tasks.len(), "Started workers");

        // Stop handing out items once shutdown is signaled and hold the runtime open until
        // in-flight reconciles finish.
        let drain = runtime.shutdown_handle();
        tokio::spawn(
            async move {
                let release = drain.signaled().await;
                info!("Shutting down work queue");
                queue.shutdown();
                release.release_after(future::join_all(tasks)).await;
            }
            .instrument(info_span!("shutdown")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
