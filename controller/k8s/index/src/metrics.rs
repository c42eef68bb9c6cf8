use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    index_size: Family<NamespaceLabels, Gauge>,
    index_applies: Family<NamespaceLabels, Counter>,
    index_deletes: Family<NamespaceLabels, Counter>,
    index_resets: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct NamespaceLabels {
    namespace: String,
}

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of deployments in the index",
            index_size.clone(),
        );

        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        let index_resets = Counter::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        Self {
            index_size,
            index_applies,
            index_deletes,
            index_resets,
        }
    }

    pub(crate) fn set_size(&self, namespace: &str, size: usize) {
        self.index_size
            .get_or_create(&NamespaceLabels::new(namespace))
            .set(size as i64);
    }

    pub(crate) fn inc_applies(&self, namespace: &str) {
        self.index_applies
            .get_or_create(&NamespaceLabels::new(namespace))
            .inc();
    }

    pub(crate) fn inc_deletes(&self, namespace: &str) {
        self.index_deletes
            .get_or_create(&NamespaceLabels::new(namespace))
            .inc();
    }

    pub(crate) fn inc_resets(&self) {
        self.index_resets.inc();
    }
}

impl NamespaceLabels {
    fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }
}
