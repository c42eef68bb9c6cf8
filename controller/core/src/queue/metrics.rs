use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct QueueMetrics {
    pub(super) depth: Gauge,
    pub(super) adds: Counter,
    pub(super) retries: Counter,
}

impl QueueMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let depth = Gauge::default();
        reg.register("depth", "Current number of items waiting in the queue", depth.clone());

        let adds = Counter::default();
        reg.register("adds", "Total number of items added to the queue", adds.clone());

        let retries = Counter::default();
        reg.register(
            "retries",
            "Total number of items requeued after a failure",
            retries.clone(),
        );

        Self {
            depth,
            adds,
            retries,
        }
    }
}
