//! Applies tenant isolation to DNS queries.
//!
//! A [`Dispatch`] sits in a DNS server's query pipeline. For each address query it resolves the
//! queried name, asks the authorizer whether the querying client may learn the resolved address,
//! and either lets the query continue to the next stage or answers it with an empty response.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod metrics;
mod resolve;


pub use self::resolve::{Resolve, Upstream};
pub use hickory_proto::{
    op::ResponseCode,
    rr::{Name, RecordType},
};

use anyhow::Result;
use hickory_proto::op::Message;
use std::net::IpAddr;
use tenant_dns_core::Authorize;
use tenant_dns_k8s_index::SyncGate;

/// A single DNS question and the address of the client that asked it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub source: IpAddr,
    pub name: Name,
    pub record_type: RecordType,
}

/// What the host should do with a query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Pass the query to the next stage unmodified.
    Forward,

    /// Answer the query with an empty answer section and this response code.
    Respond(ResponseCode),
}

/// How a query was handled by [`Dispatch::serve`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Served {
    /// The next stage handled the query and returned this code.
    Next(ResponseCode),

    /// The query was answered without consulting the next stage.
    Answered(ResponseCode),
}

/// The next stage of the host's query pipeline.
#[async_trait::async_trait]
pub trait Next: Send + Sync {
    async fn serve(&self, query: &Query) -> Result<ResponseCode>;
}

#[derive(Clone, Debug)]
pub struct Dispatch<R, A> {
    resolver: R,
    authorizer: A,
    gate: SyncGate,
    metrics: metrics::QueryMetrics,
}

// === impl Query ===

impl Query {
    pub fn new(source: IpAddr, name: Name, record_type: RecordType) -> Self {
        Self {
            source,
            name,
            record_type,
        }
    }

    /// Builds a query from the first question of a request message.
    pub fn from_request(source: IpAddr, request: &Message) -> Option<Self> {
        let question = request.queries().first()?;
        Some(Self::new(
            source,
            question.name().clone(),
            question.query_type(),
        ))
    }

    fn is_address(&self) -> bool {
        matches!(self.record_type, RecordType::A | RecordType::AAAA)
    }
}

// === impl Dispatch ===

impl<R, A> Dispatch<R, A>
where
    R: Resolve,
    A: Authorize,
{
    pub fn new(resolver: R, authorizer: A, gate: SyncGate, metrics: metrics::QueryMetrics) -> Self {
        Self {
            resolver,
            authorizer,
            gate,
            metrics,
        }
    }

    pub async fn dispatch(&self, query: &Query) -> Outcome {
        if !self.gate.is_ready() {
            tracing::debug!(name = %query.name, "resources not yet synced");
            self.metrics.not_ready();
            return Outcome::Respond(ResponseCode::ServFail);
        }

        if !query.is_address() {
            tracing::trace!(
                name = %query.name,
                record_type = %query.record_type,
                "passing through",
            );
            self.metrics.passthrough();
            return Outcome::Forward;
        }

        let destination = match self.resolver.resolve(&query.name, query.record_type).await {
            Ok(addrs) => match addrs.first() {
                Some(addr) => *addr,
                None => {
                    tracing::debug!(name = %query.name, "no addresses resolved");
                    self.metrics.unresolved();
                    return Outcome::Forward;
                }
            },
            Err(error) => {
                tracing::debug!(%error, name = %query.name, "failed to resolve");
                self.metrics.unresolved();
                return Outcome::Forward;
            }
        };

        let decision = self.authorizer.authorize(query.source, destination);
        self.metrics.decided(&decision);
        if decision.allowed {
            tracing::debug!(
                source = %query.source,
                name = %query.name,
                %destination,
                rule = %decision.rule,
                "allowed",
            );
            return Outcome::Forward;
        }

        tracing::info!(
            source = %query.source,
            name = %query.name,
            %destination,
            rule = %decision.rule,
            "blocking query due to tenant isolation policy",
        );
        Outcome::Respond(ResponseCode::NoError)
    }

    pub async fn serve<N>(&self, query: &Query, next: &N) -> Result<Served>
    where
        N: Next + ?Sized,
    {
        match self.dispatch(query).await {
            Outcome::Forward => next.serve(query).await.map(Served::Next),
            Outcome::Respond(code) => Ok(Served::Answered(code)),
        }
    }
}
