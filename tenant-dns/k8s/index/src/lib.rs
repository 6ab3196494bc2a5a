//! Cluster indexes for tenant-aware DNS
//!
//! The indexes are maintained from Kubernetes watches, each owned by a single task that applies
//! watch events through `kubert::index`:
//!
//! - Each `Pod` and each `Service` is indexed by the addresses assigned to it. Pods and services
//!   are held in separate indexes, each behind its own lock, so that the two watches never contend
//!   with each other.
//! - Each `Namespace` is indexed by name, holding its labels (which carry the tenant label).
//!
//! ```text
//! [ IP ] -> [ Pod | Service ] -> [ Namespace ]
//! ```
//!
//! Lookups are served from the query path while the watches continue to update the indexes; each
//! lookup observes whatever state the owning watch has applied so far. Each index is wrapped in a
//! [`Tracked`] handle so that the [`SyncGate`] reports ready only once every watch's initial
//! listing has been written to its index.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod addresses;
pub mod metrics;
pub mod namespaces;
mod sync;


pub use self::{
    namespaces::Groups,
    sync::{SyncGate, Synced, Tracked},
};
use tenant_dns_core::{AddressOwner, LookupAddress};
use tenant_dns_k8s_api::{Pod, Service};

/// Maps addresses to their owning resources, probing pods before services.
#[derive(Clone, Debug)]
pub struct ReverseIndex {
    pods: addresses::SharedIndex<Pod>,
    services: addresses::SharedIndex<Service>,
}

// === impl ReverseIndex ===

impl ReverseIndex {
    pub fn new(
        pods: addresses::SharedIndex<Pod>,
        services: addresses::SharedIndex<Service>,
    ) -> Self {
        Self { pods, services }
    }

    pub fn pods(&self) -> &addresses::SharedIndex<Pod> {
        &self.pods
    }

    pub fn services(&self) -> &addresses::SharedIndex<Service> {
        &self.services
    }
}

impl LookupAddress for ReverseIndex {
    fn lookup_address(&self, addr: std::net::IpAddr) -> Option<AddressOwner> {
        let pod = self.pods.read().lookup(addr);
        if pod.is_some() {
            return pod;
        }
        self.services.read().lookup(addr)
    }
}
