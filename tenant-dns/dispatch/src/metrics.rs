use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use tenant_dns_core::Decision;

#[derive(Clone, Debug, Default)]
pub struct QueryMetrics {
    queries: Family<QueryLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct QueryLabels {
    outcome: &'static str,
    rule: &'static str,
}

// === impl QueryMetrics ===

impl QueryMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let queries = Family::<QueryLabels, Counter>::default();
        reg.register(
            "queries",
            "Total number of queries handled, by outcome and deciding rule",
            queries.clone(),
        );
        Self { queries }
    }

    pub(crate) fn not_ready(&self) {
        self.inc("not_ready", "");
    }

    pub(crate) fn passthrough(&self) {
        self.inc("passthrough", "");
    }

    pub(crate) fn unresolved(&self) {
        self.inc("unresolved", "");
    }

    pub(crate) fn decided(&self, decision: &Decision) {
        let outcome = if decision.allowed { "allowed" } else { "denied" };
        self.inc(outcome, decision.rule.as_str());
    }

    fn inc(&self, outcome: &'static str, rule: &'static str) {
        self.queries
            .get_or_create(&QueryLabels { outcome, rule })
            .inc();
    }
}
