//! Tenant isolation for cluster DNS.
//!
//! Decides whether the owner of a source address may learn the address of a destination. Both
//! addresses are classified against the cluster's reverse index (address to Pod or Service) and
//! the namespace index, and the pair is evaluated against an ordered list of [`Rule`]s:
//!
//! ```text
//! [ source IP ] -> [ Pod | Service ] -> [ Namespace ] -> tenant label
//! [ dest IP ]   -> [ Pod | Service ] -> [ Namespace ] -> tenant label, whitelists
//! ```
//!
//! Anything the indexes cannot classify is allowed. A query is only denied when both ends are
//! known and the destination is either untenanted or owned by another tenant.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authz;
mod endpoint;
mod lookup;

pub use self::{
    authz::{Authorize, Authorizer, Decision, Policy, Rule},
    endpoint::Endpoint,
    lookup::{AddressOwner, Group, LookupAddress, LookupGroup, ResourceKind, ResourceRef},
};
pub use tenant_dns_k8s_api::{Labels, Selector};
