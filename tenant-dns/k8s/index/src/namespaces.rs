use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tenant_dns_core::{Group, LookupGroup};
use tenant_dns_k8s_api::{Labels, Namespace};

/// Holds the labels of every namespace in the cluster, keyed by name.
#[derive(Debug, Default)]
pub struct Index {
    by_name: HashMap<String, Labels>,
}

pub type SharedIndex = Arc<RwLock<Index>>;

/// A read handle on a shared namespace [`Index`].
#[derive(Clone, Debug)]
pub struct Groups(SharedIndex);

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn get(&self, name: &str) -> Option<Group> {
        let labels = self.by_name.get(name)?;
        Some(Group {
            name: name.to_string(),
            labels: labels.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl kubert::index::IndexClusterResource<Namespace> for Index {
    fn apply(&mut self, mut ns: Namespace) {
        let Some(name) = ns.metadata.name.take().filter(|n| !n.is_empty()) else {
            tracing::warn!("ignoring namespace without a name");
            return;
        };

        let labels = Labels::from(ns.metadata.labels.take());
        tracing::debug!(%name, labels = labels.len(), "indexing namespace");
        self.by_name.insert(name, labels);
    }

    fn delete(&mut self, name: String) {
        tracing::debug!(%name, "deleting namespace");
        self.by_name.remove(&name);
    }
}

// === impl Groups ===

impl Groups {
    pub fn new(index: SharedIndex) -> Self {
        Self(index)
    }
}

impl LookupGroup for Groups {
    fn lookup_group(&self, name: &str) -> Option<Group> {
        self.0.read().get(name)
    }
}
