use crate::Labels;
use std::{fmt, net::IpAddr, sync::Arc};

/// Finds the resource that currently owns an address.
pub trait LookupAddress {
    fn lookup_address(&self, addr: IpAddr) -> Option<AddressOwner>;
}

/// Finds a namespace by its exact name.
pub trait LookupGroup {
    fn lookup_group(&self, name: &str) -> Option<Group>;
}

/// The kinds of addressable resources tracked by the reverse index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Workload,
    Service,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub namespace: String,
    pub name: String,
}

/// A resource that owns an address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressOwner {
    pub kind: ResourceKind,
    pub resource: ResourceRef,
    pub labels: Labels,
}

/// A namespace and its labels. The tenant, if any, is one of the labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub labels: Labels,
}

// === impl ResourceKind ===

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workload => "pod",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ResourceRef ===

impl ResourceRef {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.namespace)
    }
}

// === impl Group ===

impl Group {
    /// Returns the value of the tenant label, if the namespace has one.
    ///
    /// A namespace with an empty tenant label belongs to the tenant `""`, which is distinct from
    /// having no tenant.
    pub fn tenant<'l>(&'l self, tenant_label: &str) -> Option<&'l str> {
        self.labels.get(tenant_label)
    }
}

// === blanket impls ===

impl<T: LookupAddress + ?Sized> LookupAddress for Arc<T> {
    #[inline]
    fn lookup_address(&self, addr: IpAddr) -> Option<AddressOwner> {
        (**self).lookup_address(addr)
    }
}

impl<T: LookupAddress + ?Sized> LookupAddress for &T {
    #[inline]
    fn lookup_address(&self, addr: IpAddr) -> Option<AddressOwner> {
        (**self).lookup_address(addr)
    }
}

impl<T: LookupGroup + ?Sized> LookupGroup for Arc<T> {
    #[inline]
    fn lookup_group(&self, name: &str) -> Option<Group> {
        (**self).lookup_group(name)
    }
}

impl<T: LookupGroup + ?Sized> LookupGroup for &T {
    #[inline]
    fn lookup_group(&self, name: &str) -> Option<Group> {
        (**self).lookup_group(name)
    }
}
