use anyhow::Result;
use hickory_proto::rr::{Name, RecordType};
use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    TokioResolver,
};
use std::{net::IpAddr, sync::Arc};

/// Resolves names to addresses for authorization.
#[async_trait::async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, name: &Name, record_type: RecordType) -> Result<Vec<IpAddr>>;
}

/// Resolves names against an external DNS server.
///
/// The resolver's cache is disabled so that every authorization observes current records.
#[derive(Clone)]
pub struct Upstream(TokioResolver);

// === impl Upstream ===

impl Upstream {
    /// Uses the nameservers from the system's resolver configuration.
    pub fn system() -> Result<Self> {
        let mut builder = TokioResolver::builder_tokio()?;
        disable_cache(builder.options_mut());
        Ok(Self(builder.build()))
    }

    pub fn with_nameservers(addrs: &[IpAddr], port: u16) -> Self {
        let config = ResolverConfig::from_parts(
            None,
            Vec::new(),
            NameServerConfigGroup::from_ips_clear(addrs, port, true),
        );
        let mut opts = ResolverOpts::default();
        disable_cache(&mut opts);
        let resolver =
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();
        Self(resolver)
    }
}

fn disable_cache(opts: &mut ResolverOpts) {
    opts.cache_size = 0;
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Resolve for Upstream {
    async fn resolve(&self, name: &Name, record_type: RecordType) -> Result<Vec<IpAddr>> {
        let lookup = self.0.lookup(name.clone(), record_type).await?;
        Ok(lookup.iter().filter_map(|rdata| rdata.ip_addr()).collect())
    }
}

#[async_trait::async_trait]
impl<T: Resolve + ?Sized> Resolve for Arc<T> {
    async fn resolve(&self, name: &Name, record_type: RecordType) -> Result<Vec<IpAddr>> {
        (**self).resolve(name, record_type).await
    }
}
