//! Indexes addressable resources by the addresses assigned to them.
//!
//! One [`Index`] is kept per resource kind. Several resources of the same kind may briefly claim an
//! address, e.g. when an address is reassigned before the watch has observed the prior owner's
//! update. Claims are kept in the order they were first observed and lookups return the most
//! recent one; stale claims are dropped as soon as the prior owner is updated or deleted.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, marker::PhantomData, net::IpAddr, sync::Arc};
use tenant_dns_core::{AddressOwner, ResourceKind, ResourceRef};
use tenant_dns_k8s_api::{Labels, Pod, ResourceExt, Service};

/// A resource kind that is assigned network addresses.
pub trait Addressable: ResourceExt {
    const KIND: ResourceKind;

    /// Returns the resource's currently-assigned addresses, as reported by the API.
    fn addrs(&self) -> Vec<&str>;
}

#[derive(Debug)]
pub struct Index<T> {
    by_addr: HashMap<IpAddr, Vec<ResourceRef>>,
    by_resource: HashMap<ResourceRef, Resource>,
    _kind: PhantomData<fn(T)>,
}

pub type SharedIndex<T> = Arc<RwLock<Index<T>>>;

#[derive(Debug)]
struct Resource {
    addrs: HashSet<IpAddr>,
    labels: Labels,
}

// === impl Index ===

impl<T: Addressable> Index<T> {
    pub fn shared() -> SharedIndex<T> {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn lookup(&self, addr: IpAddr) -> Option<AddressOwner> {
        let resource = self.by_addr.get(&addr)?.last()?;
        let labels = self
            .by_resource
            .get(resource)
            .map(|r| r.labels.clone())
            .unwrap_or_default();
        Some(AddressOwner {
            kind: T::KIND,
            resource: resource.clone(),
            labels,
        })
    }

    /// Returns the addresses currently assigned to `resource`.
    #[cfg(test)]
    pub(crate) fn addrs_of(&self, resource: &ResourceRef) -> impl Iterator<Item = IpAddr> + '_ {
        self.by_resource
            .get(resource)
            .into_iter()
            .flat_map(|r| r.addrs.iter().copied())
    }

    /// The number of indexed addresses.
    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    fn update(&mut self, resource: ResourceRef, labels: Labels, addrs: HashSet<IpAddr>) {
        if addrs.is_empty() {
            self.remove(&resource);
            return;
        }

        let prior = self.by_resource.insert(
            resource.clone(),
            Resource {
                addrs: addrs.clone(),
                labels,
            },
        );
        if let Some(prior) = prior {
            for addr in prior.addrs.difference(&addrs) {
                tracing::trace!(%addr, "releasing stale address");
                self.release(*addr, &resource);
            }
        }

        for addr in addrs {
            let claims = self.by_addr.entry(addr).or_default();
            if !claims.contains(&resource) {
                claims.push(resource.clone());
            }
        }
    }

    fn remove(&mut self, resource: &ResourceRef) {
        if let Some(prior) = self.by_resource.remove(resource) {
            for addr in prior.addrs {
                self.release(addr, resource);
            }
        }
    }

    fn release(&mut self, addr: IpAddr, resource: &ResourceRef) {
        if let Entry::Occupied(mut entry) = self.by_addr.entry(addr) {
            entry.get_mut().retain(|r| r != resource);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }
}

impl<T> Default for Index<T> {
    fn default() -> Self {
        Self {
            by_addr: HashMap::default(),
            by_resource: HashMap::default(),
            _kind: PhantomData,
        }
    }
}

impl<T: Addressable> kubert::index::IndexNamespacedResource<T> for Index<T> {
    fn apply(&mut self, mut obj: T) {
        let name = obj.name_any();
        let Some(namespace) = obj.namespace() else {
            tracing::warn!(kind = %T::KIND, %name, "ignoring resource without a namespace");
            return;
        };
        let resource = ResourceRef { namespace, name };

        let addrs = parse_addrs(T::KIND, &resource, &obj.addrs());
        let labels = Labels::from(obj.meta_mut().labels.take());
        tracing::debug!(kind = %T::KIND, %resource, addrs = addrs.len(), "indexing");
        self.update(resource, labels, addrs);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let resource = ResourceRef { namespace, name };
        tracing::debug!(kind = %T::KIND, %resource, "deleting");
        self.remove(&resource);
    }
}

fn parse_addrs(kind: ResourceKind, resource: &ResourceRef, addrs: &[&str]) -> HashSet<IpAddr> {
    addrs
        .iter()
        .filter(|ip| !ip.is_empty() && **ip != "None")
        .filter_map(|ip| match ip.parse() {
            Ok(addr) => Some(addr),
            Err(error) => {
                tracing::warn!(%error, %kind, %resource, ip, "invalid address");
                None
            }
        })
        .collect()
}

// === impl Addressable ===

impl Addressable for Pod {
    const KIND: ResourceKind = ResourceKind::Workload;

    /// Pods on the host network share the node's address, and pods that have terminated have
    /// released theirs; neither is reported.
    fn addrs(&self) -> Vec<&str> {
        let host_network = self
            .spec
            .as_ref()
            .and_then(|spec| spec.host_network)
            .unwrap_or(false);
        if host_network {
            return Vec::new();
        }

        let Some(status) = self.status.as_ref() else {
            return Vec::new();
        };
        if matches!(status.phase.as_deref(), Some("Succeeded" | "Failed")) {
            return Vec::new();
        }

        match status.pod_ips.as_deref() {
            Some(ips) if !ips.is_empty() => ips.iter().map(|ip| ip.ip.as_str()).collect(),
            _ => status.pod_ip.as_deref().into_iter().collect(),
        }
    }
}

impl Addressable for Service {
    const KIND: ResourceKind = ResourceKind::Service;

    fn addrs(&self) -> Vec<&str> {
        let Some(spec) = self.spec.as_ref() else {
            return Vec::new();
        };
        match spec.cluster_ips.as_deref() {
            Some(ips) if !ips.is_empty() => ips.iter().map(String::as_str).collect(),
            _ => spec.cluster_ip.as_deref().into_iter().collect(),
        }
    }
}
