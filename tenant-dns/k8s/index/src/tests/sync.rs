use super::*;
use crate::{addresses, namespaces, Groups, SyncGate, Tracked};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use std::sync::Arc;
use tenant_dns_core::LookupGroup;
use tenant_dns_k8s_api::watcher;
use tokio::time;

/// Records whether the gate was already open when the initial listing was applied.
struct Observed {
    index: addresses::Index<k8s::Pod>,
    gate: SyncGate,
    ready_at_reset: Option<bool>,
}

impl IndexNamespacedResource<k8s::Pod> for Observed {
    fn apply(&mut self, pod: k8s::Pod) {
        self.index.apply(pod);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.index.delete(namespace, name);
    }

    fn reset(&mut self, pods: Vec<k8s::Pod>, removed: NamespacedRemoved) {
        self.ready_at_reset = Some(self.gate.is_ready());
        self.index.reset(pods, removed);
    }
}

#[test]
fn empty_gate_is_never_ready() {
    let gate = SyncGate::default();
    assert!(!gate.is_ready());
    assert_eq!(gate.pending(), 0);
    assert_eq!(gate.registered(), 0);
}

#[test]
fn ready_once_every_watch_syncs() {
    let gate = SyncGate::default();
    let mut pods = gate.register("pods");
    let mut services = gate.register("services");
    let mut namespaces = gate.register("namespaces");
    assert_eq!(gate.registered(), 3);

    pods.mark();
    assert!(!gate.is_ready());

    // Marking twice does not count twice.
    pods.mark();
    services.mark();
    assert!(!gate.is_ready());
    assert_eq!(gate.pending(), 1);

    namespaces.mark();
    assert!(gate.is_ready());
    assert_eq!(gate.pending(), 0);
}

#[test]
fn readiness_is_monotonic() {
    let gate = SyncGate::default();
    let mut pods = gate.register("pods");
    pods.mark();
    assert!(gate.is_ready());

    drop(pods);
    assert!(gate.is_ready());
}

#[tokio::test(flavor = "current_thread")]
async fn ready_completes_when_synced() {
    let gate = SyncGate::default();
    let mut pods = gate.register("pods");

    let ready = tokio::spawn({
        let gate = gate.clone();
        async move { gate.ready().await }
    });
    tokio::task::yield_now().await;
    assert!(!ready.is_finished());

    pods.mark();
    time::timeout(time::Duration::from_secs(1), ready)
        .await
        .expect("gate must become ready")
        .unwrap();
}

#[tokio::test(flavor = "current_thread")]
async fn gate_opens_after_initial_listing_is_indexed() {
    let _trace = tracing_subscriber::fmt().with_test_writer().try_init();

    let gate = SyncGate::default();
    let observed = Arc::new(RwLock::new(Observed {
        index: addresses::Index::default(),
        gate: gate.clone(),
        ready_at_reset: None,
    }));
    let tracked = Tracked::new(observed.clone(), gate.register("pods")).shared();

    kubert::index::namespaced(
        tracked,
        futures::stream::iter([
            watcher::Event::Init,
            watcher::Event::InitApply(mk_pod("ns-0", "pod-0", ["10.0.0.1"])),
            watcher::Event::InitDone,
        ]),
    )
    .await;

    let observed = observed.read();
    assert_eq!(observed.ready_at_reset, Some(false));
    assert!(gate.is_ready());
    assert!(observed.index.lookup(ip("10.0.0.1")).is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn listing_is_visible_once_ready() {
    let gate = SyncGate::default();
    let pods = addresses::Index::<k8s::Pod>::shared();
    let tracked = Tracked::new(pods.clone(), gate.register("pods")).shared();

    let (tx, rx) = futures::channel::mpsc::unbounded();
    let watch = tokio::spawn(kubert::index::namespaced(tracked, rx));

    tx.unbounded_send(watcher::Event::Init).unwrap();
    tx.unbounded_send(watcher::Event::InitApply(mk_pod(
        "ns-0",
        "pod-0",
        ["10.0.0.1"],
    )))
    .unwrap();
    tokio::task::yield_now().await;

    // The listing is buffered until it completes.
    assert!(!gate.is_ready());
    assert!(pods.read().is_empty());

    tx.unbounded_send(watcher::Event::InitDone).unwrap();
    time::timeout(time::Duration::from_secs(1), gate.ready())
        .await
        .expect("gate must become ready");
    assert!(pods.read().lookup(ip("10.0.0.1")).is_some());

    // Updates after the initial listing are applied directly.
    tx.unbounded_send(watcher::Event::Apply(mk_pod(
        "ns-0",
        "pod-0",
        ["10.0.0.2"],
    )))
    .unwrap();
    drop(tx);
    watch.await.unwrap();
    assert!(pods.read().lookup(ip("10.0.0.1")).is_none());
    assert!(pods.read().lookup(ip("10.0.0.2")).is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn relist_keeps_gate_open() {
    let gate = SyncGate::default();
    let index = namespaces::Index::shared();
    let groups = Groups::new(index.clone());
    let tracked = Tracked::new(index.clone(), gate.register("namespaces")).shared();

    kubert::index::cluster(
        tracked,
        futures::stream::iter([
            watcher::Event::Init,
            watcher::Event::InitApply(mk_namespace("ns-0", [])),
            watcher::Event::InitApply(mk_namespace("ns-1", [])),
            watcher::Event::InitDone,
            // The watch restarts and relists without `ns-1`.
            watcher::Event::Init,
            watcher::Event::InitApply(mk_namespace("ns-0", [])),
            watcher::Event::InitDone,
        ]),
    )
    .await;

    assert!(gate.is_ready());
    assert!(groups.lookup_group("ns-0").is_some());
    assert_eq!(groups.lookup_group("ns-1"), None);
}
