use crate::{
    core::{Authorizer, Policy},
    dispatch::{metrics::QueryMetrics, Dispatch, Upstream},
    index::{self, Groups, ReverseIndex, SyncGate, Tracked},
    k8s::{self, watcher, Selector},
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::Future;
use prometheus_client::registry::Registry;
use std::net::IpAddr;
use tokio::time;
use tracing::{info, info_span, Instrument};

/// The dispatch handed to the DNS server hosting the tenant filter.
pub type TenantDispatch = Dispatch<Upstream, Authorizer<ReverseIndex, Groups>>;

const SYNC_WARN_INTERVAL: time::Duration = time::Duration::from_secs(10);

#[derive(Debug, Parser)]
#[clap(name = "tenant-dns", about = "Tenant-isolating DNS query filter")]
pub struct Args {
    #[clap(long, default_value = "tenant_dns=info,warn", env = "TENANT_DNS_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The namespace label whose value names the namespace's tenant.
    #[clap(long, default_value = k8s::DEFAULT_TENANT_LABEL)]
    tenant_label: String,

    /// Selects services that may be resolved from any tenant.
    #[clap(long)]
    labels: Option<Selector>,

    /// Selects namespaces whose addresses may be resolved from any tenant.
    #[clap(long)]
    namespace_labels: Option<Selector>,

    /// Nameservers used to resolve queried names.
    ///
    /// When unset, the system resolver configuration is used.
    #[clap(long)]
    resolver_addrs: Option<IpAddrs>,

    #[clap(long, default_value = "53")]
    resolver_port: u16,
}

impl Args {
    /// Runs the controller, handing a dispatch to `serve` once the runtime is initialized.
    ///
    /// `serve` runs on its own task and should complete when the shutdown watch is signaled.
    pub async fn run<F, S>(self, serve: F) -> Result<()>
    where
        F: FnOnce(TenantDispatch, drain::Watch) -> S,
        S: Future<Output = Result<()>> + Send + 'static,
    {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            tenant_label,
            labels,
            namespace_labels,
            resolver_addrs,
            resolver_port,
        } = self;

        let policy = Policy::new(tenant_label)
            .with_service_whitelist(labels)
            .with_namespace_whitelist(namespace_labels);

        let resolver = match resolver_addrs {
            Some(IpAddrs(addrs)) => Upstream::with_nameservers(&addrs, resolver_port),
            None => Upstream::system()?,
        };

        let addresses = ReverseIndex::new(
            index::addresses::Index::shared(),
            index::addresses::Index::shared(),
        );
        let namespaces = index::namespaces::Index::shared();

        // Every watch must be registered before any of them is spawned.
        let gate = SyncGate::default();
        let pods_synced = gate.register("pods");
        let services_synced = gate.register("services");
        let namespaces_synced = gate.register("namespaces");

        let mut prom = <Registry>::default();
        index::metrics::register(
            prom.sub_registry_with_prefix("index"),
            addresses.clone(),
            namespaces.clone(),
            gate.clone(),
        );
        let query_metrics = QueryMetrics::register(prom.sub_registry_with_prefix("dispatch"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn resource watches.

        let pods = runtime.watch_all::<k8s::Pod>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(
                Tracked::new(addresses.pods().clone(), pods_synced).shared(),
                pods,
            )
            .instrument(info_span!("pods")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(
                Tracked::new(addresses.services().clone(), services_synced).shared(),
                services,
            )
            .instrument(info_span!("services")),
        );

        let ns = runtime.watch_all::<k8s::Namespace>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(
                Tracked::new(namespaces.clone(), namespaces_synced).shared(),
                ns,
            )
            .instrument(info_span!("namespaces")),
        );

        tokio::spawn(await_synced(gate.clone()).instrument(info_span!("sync")));

        let authorizer = Authorizer::new(addresses, Groups::new(namespaces), policy);
        let policy = authorizer.policy();
        info!(
            tenant_label = %policy.tenant_label,
            service_whitelist = ?policy.service_whitelist.as_ref().map(ToString::to_string),
            namespace_whitelist = ?policy.namespace_whitelist.as_ref().map(ToString::to_string),
            "Configured tenant isolation",
        );

        let dispatch = Dispatch::new(resolver, authorizer, gate, query_metrics);
        let server = serve(dispatch, runtime.shutdown_handle());
        tokio::spawn(
            async move {
                if let Err(error) = server.await {
                    tracing::error!(%error, "DNS server failed");
                }
            }
            .instrument(info_span!("serve")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background
        // tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Logs until every watch has completed its initial listing. Queries are refused until then.
async fn await_synced(gate: SyncGate) {
    info!(watches = gate.registered(), "Waiting for resources to sync");
    while time::timeout(SYNC_WARN_INTERVAL, gate.ready()).await.is_err() {
        tracing::warn!(
            pending = gate.pending(),
            registered = gate.registered(),
            "Still waiting for resources to sync; queries are being refused",
        );
    }
    info!("Synced all required resources");
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct IpAddrs(Vec<IpAddr>);

impl std::str::FromStr for IpAddrs {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(|a| a.trim().parse().map_err(Into::into))
            .collect::<Result<Vec<IpAddr>>>()
            .map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["tenant-dns"]).unwrap();
        assert_eq!(args.tenant_label, "capsule.clastix.io/tenant");
        assert_eq!(args.labels, None);
        assert_eq!(args.namespace_labels, None);
        assert_eq!(args.resolver_addrs, None);
        assert_eq!(args.resolver_port, 53);
    }

    #[test]
    fn parses_whitelists() {
        let args = Args::try_parse_from([
            "tenant-dns",
            "--tenant-label=example.com/tenant",
            "--labels=app=shared,tier in (frontend)",
            "--namespace-labels=!restricted",
        ])
        .unwrap();
        assert_eq!(args.tenant_label, "example.com/tenant");
        assert_eq!(
            args.labels,
            Some("app=shared,tier in (frontend)".parse().unwrap())
        );
        assert_eq!(args.namespace_labels, Some("!restricted".parse().unwrap()));
    }

    #[test]
    fn rejects_malformed_selectors() {
        assert!(Args::try_parse_from(["tenant-dns", "--labels=app in (web"]).is_err());
    }

    #[test]
    fn parses_resolver_addrs() {
        let args = Args::try_parse_from([
            "tenant-dns",
            "--resolver-addrs=10.96.0.10,fd00::a",
            "--resolver-port=5353",
        ])
        .unwrap();
        assert_eq!(
            args.resolver_addrs,
            Some(IpAddrs(vec![
                "10.96.0.10".parse().unwrap(),
                "fd00::a".parse().unwrap()
            ]))
        );
        assert_eq!(args.resolver_port, 5353);

        assert!(Args::try_parse_from(["tenant-dns", "--resolver-addrs=10.96.0.300"]).is_err());
    }
}
