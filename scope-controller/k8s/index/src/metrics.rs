use crate::SharedIndex;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};

/// Counts scope lookups against the index.
#[derive(Clone, Debug, Default)]
pub struct ScopeMetrics {
    builds: Family<BuildLabels, Counter>,
    cache_hits: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildLabels {
    kind: &'static str,
}

#[derive(Debug)]
struct Instrumented(SharedIndex);

/// Registers a collector that reports the sizes of the index's tables.
pub fn register(reg: &mut Registry, index: SharedIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

// === impl ScopeMetrics ===

impl ScopeMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let builds = Family::default();
        reg.register(
            "scope_builds",
            "Count of sidecar scopes built, by kind",
            builds.clone(),
        );

        let cache_hits = Counter::default();
        reg.register(
            "scope_cache_hits",
            "Count of scope lookups served from the cache",
            cache_hits.clone(),
        );

        Self { builds, cache_hits }
    }

    pub(crate) fn build(&self, from_sidecar: bool) {
        let kind = if from_sidecar { "sidecar" } else { "default" };
        self.builds.get_or_create(&BuildLabels { kind }).inc();
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.inc();
    }
}

// === impl Instrumented ===

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let this = self.0.read();
        let mesh = this.mesh();

        for (name, help, size) in [
            (
                "service_index_size",
                "The number of services in the mesh index",
                mesh.services_len(),
            ),
            (
                "routing_rule_index_size",
                "The number of routing rules in the mesh index",
                mesh.routing_rules_len(),
            ),
            (
                "policy_index_size",
                "The number of policies in the mesh index",
                mesh.policies_len(),
            ),
            (
                "scope_cache_size",
                "The number of memoized sidecar scopes",
                this.cached_scopes(),
            ),
        ] {
            let size_encoder = encoder.encode_descriptor(name, help, None, MetricType::Gauge)?;
            ConstGauge::new(size as i64).encode(size_encoder)?;
        }

        let mut sidecar_encoder = encoder.encode_descriptor(
            "sidecar_index_size",
            "The number of sidecars in the index",
            None,
            MetricType::Gauge,
        )?;
        for (ns, size) in this.namespace_sizes() {
            let labels = vec![("namespace", ns)];
            let ns_encoder = sidecar_encoder.encode_family(&labels)?;
            ConstGauge::new(size as i64).encode(ns_encoder)?;
        }

        Ok(())
    }
}
