//! Runs the tenant DNS filter against a Kubernetes cluster.
//!
//! [`Args::run`] builds the kubert runtime, spawns the `Pod`, `Service` and `Namespace` watches
//! that maintain the indexes and hands the resulting [`TenantDispatch`] to the hosting DNS server.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use tenant_dns_core as core;
pub use tenant_dns_dispatch as dispatch;
pub use tenant_dns_k8s_api as k8s;
pub use tenant_dns_k8s_index as index;

mod args;

pub use self::args::{Args, TenantDispatch};
