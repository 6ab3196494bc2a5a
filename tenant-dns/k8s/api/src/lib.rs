#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod selector;

pub use self::{labels::Labels, selector::Selector};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Namespace, Pod, PodSpec, PodStatus, Service, ServiceSpec},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
pub use kube::{runtime::watcher, Resource, ResourceExt};

/// The namespace label that names the namespace's owning tenant.
pub const DEFAULT_TENANT_LABEL: &str = "capsule.clastix.io/tenant";
