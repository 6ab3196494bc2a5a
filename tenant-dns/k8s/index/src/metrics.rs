use crate::{namespaces, ReverseIndex, SyncGate};
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};
use tenant_dns_core::ResourceKind;

#[derive(Debug)]
struct Instrumented {
    addresses: ReverseIndex,
    namespaces: namespaces::SharedIndex,
    gate: SyncGate,
}

pub fn register(
    reg: &mut Registry,
    addresses: ReverseIndex,
    namespaces: namespaces::SharedIndex,
    gate: SyncGate,
) {
    reg.register_collector(Box::new(Instrumented {
        addresses,
        namespaces,
        gate,
    }));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        // Each index is read under its own lock so that no two locks are held at once.
        let pods = self.addresses.pods().read().len();
        let services = self.addresses.services().read().len();
        let namespaces = self.namespaces.read().len();

        let mut address_encoder = encoder.encode_descriptor(
            "address_index_size",
            "The number of addresses in the reverse index",
            None,
            MetricType::Gauge,
        )?;
        for (kind, size) in [
            (ResourceKind::Workload, pods),
            (ResourceKind::Service, services),
        ] {
            let labels = vec![("kind", kind.as_str())];
            let address_encoder = address_encoder.encode_family(&labels)?;
            ConstGauge::new(size as u32).encode(address_encoder)?;
        }

        let namespace_encoder = encoder.encode_descriptor(
            "namespace_index_size",
            "The number of namespaces in the namespace index",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(namespaces as u32).encode(namespace_encoder)?;

        let pending_encoder = encoder.encode_descriptor(
            "pending_watches",
            "The number of watches that have not completed their initial listing",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(self.gate.pending() as u32).encode(pending_encoder)?;

        Ok(())
    }
}
