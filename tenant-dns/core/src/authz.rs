use crate::{Endpoint, LookupAddress, LookupGroup, ResourceKind, Selector};
use std::{fmt, net::IpAddr};


/// Decides whether a source address may resolve a destination address.
pub trait Authorize {
    fn authorize(&self, source: IpAddr, destination: IpAddr) -> Decision;
}

/// Operator configuration, fixed for the life of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    /// The namespace label whose value names the namespace's tenant.
    pub tenant_label: String,

    /// Services matching this selector may be resolved from any tenant.
    pub service_whitelist: Option<Selector>,

    /// Addresses in namespaces matching this selector may be resolved from any tenant.
    pub namespace_whitelist: Option<Selector>,
}

/// Classifies addresses against the indexes and evaluates [`Rule::ORDERED`].
#[derive(Clone, Debug)]
pub struct Authorizer<A, G> {
    addresses: A,
    groups: G,
    policy: Policy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,

    /// The rule that produced the decision.
    pub rule: Rule,
}

/// An authorization rule. Rules are evaluated in [`Rule::ORDERED`] order and the first rule
/// that yields a verdict decides.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    UnknownSource,
    UntenantedSource,
    UnknownDestination,
    ServiceWhitelist,
    NamespaceWhitelist,
    UntenantedDestination,
    TenantMatch,
}

// === impl Policy ===

impl Policy {
    pub fn new(tenant_label: impl Into<String>) -> Self {
        Self {
            tenant_label: tenant_label.into(),
            service_whitelist: None,
            namespace_whitelist: None,
        }
    }

    pub fn with_service_whitelist(mut self, selector: impl Into<Option<Selector>>) -> Self {
        self.service_whitelist = selector.into();
        self
    }

    pub fn with_namespace_whitelist(mut self, selector: impl Into<Option<Selector>>) -> Self {
        self.namespace_whitelist = selector.into();
        self
    }

    fn tenant<'e>(&self, endpoint: &'e Endpoint) -> Option<&'e str> {
        endpoint.group()?.tenant(&self.tenant_label)
    }

    fn is_untenanted(&self, endpoint: &Endpoint) -> bool {
        endpoint.is_known() && self.tenant(endpoint).is_none()
    }
}

// === impl Authorizer ===

impl<A, G> Authorizer<A, G>
where
    A: LookupAddress,
    G: LookupGroup,
{
    pub fn new(addresses: A, groups: G, policy: Policy) -> Self {
        Self {
            addresses,
            groups,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Maps an address to its owning resource and namespace.
    ///
    /// An address whose owner lives in a namespace that is not indexed is `Unknown`.
    pub fn classify(&self, addr: IpAddr) -> Endpoint {
        let Some(owner) = self.addresses.lookup_address(addr) else {
            return Endpoint::Unknown;
        };
        let Some(group) = self.groups.lookup_group(&owner.resource.namespace) else {
            return Endpoint::Unknown;
        };

        match owner.kind {
            ResourceKind::Service => Endpoint::Resource {
                resource: owner.resource,
                labels: owner.labels,
                group,
            },
            ResourceKind::Workload => Endpoint::Group(group),
        }
    }

    pub fn evaluate(&self, source: &Endpoint, destination: &Endpoint) -> Decision {
        for rule in Rule::ORDERED {
            if let Some(allowed) = rule.check(source, destination, &self.policy) {
                return Decision { allowed, rule };
            }
        }

        // `TenantMatch` always yields a verdict.
        Decision {
            allowed: true,
            rule: Rule::TenantMatch,
        }
    }
}

impl<A, G> Authorize for Authorizer<A, G>
where
    A: LookupAddress,
    G: LookupGroup,
{
    fn authorize(&self, source: IpAddr, destination: IpAddr) -> Decision {
        let src = self.classify(source);
        let dst = self.classify(destination);
        self.evaluate(&src, &dst)
    }
}

impl<T: Authorize + ?Sized> Authorize for std::sync::Arc<T> {
    #[inline]
    fn authorize(&self, source: IpAddr, destination: IpAddr) -> Decision {
        (**self).authorize(source, destination)
    }
}

// === impl Rule ===

impl Rule {
    pub const ORDERED: [Rule; 7] = [
        Rule::UnknownSource,
        Rule::UntenantedSource,
        Rule::UnknownDestination,
        Rule::ServiceWhitelist,
        Rule::NamespaceWhitelist,
        Rule::UntenantedDestination,
        Rule::TenantMatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownSource => "unknown-source",
            Self::UntenantedSource => "untenanted-source",
            Self::UnknownDestination => "unknown-destination",
            Self::ServiceWhitelist => "service-whitelist",
            Self::NamespaceWhitelist => "namespace-whitelist",
            Self::UntenantedDestination => "untenanted-destination",
            Self::TenantMatch => "tenant-match",
        }
    }

    /// Returns `Some(allowed)` if this rule decides the query, or `None` to defer to the next
    /// rule.
    pub fn check(
        &self,
        source: &Endpoint,
        destination: &Endpoint,
        policy: &Policy,
    ) -> Option<bool> {
        match self {
            Self::UnknownSource => (!source.is_known()).then_some(true),

            Self::UntenantedSource => policy.is_untenanted(source).then_some(true),

            Self::UnknownDestination => (!destination.is_known()).then_some(true),

            Self::ServiceWhitelist => match destination {
                Endpoint::Resource { labels, .. } => policy
                    .service_whitelist
                    .as_ref()?
                    .matches(labels)
                    .then_some(true),
                _ => None,
            },

            Self::NamespaceWhitelist => {
                let group = destination.group()?;
                policy
                    .namespace_whitelist
                    .as_ref()?
                    .matches(&group.labels)
                    .then_some(true)
            }

            Self::UntenantedDestination => policy.is_untenanted(destination).then_some(false),

            Self::TenantMatch => Some(matches!(
                (policy.tenant(source), policy.tenant(destination)),
                (Some(src), Some(dst)) if src == dst
            )),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
