use crate::{Group, Labels, ResourceRef};

/// What the indexes know about one end of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// The address belongs to a `Service` in a known namespace.
    Resource {
        resource: ResourceRef,
        labels: Labels,
        group: Group,
    },

    /// The address belongs to a workload in a known namespace. Only namespace-level information
    /// applies.
    Group(Group),

    /// No tracked resource owns the address, or its namespace is not indexed.
    Unknown,
}

// === impl Endpoint ===

impl Endpoint {
    pub fn group(&self) -> Option<&Group> {
        match self {
            Self::Resource { group, .. } | Self::Group(group) => Some(group),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}
