use super::*;
use crate::{addresses, ReverseIndex};
use kubert::index::IndexNamespacedResource;
use tenant_dns_core::{LookupAddress, ResourceKind, ResourceRef};

fn mk_index() -> ReverseIndex {
    ReverseIndex::new(addresses::Index::shared(), addresses::Index::shared())
}

#[test]
fn indexes_pod_addresses() {
    let idx = mk_index();
    idx.pods()
        .write()
        .apply(mk_pod("ns-0", "pod-0", ["10.0.0.1", "fd00::1"]));

    for addr in [ip("10.0.0.1"), ip("fd00::1")] {
        let owner = idx.lookup_address(addr).expect("pod must be indexed");
        assert_eq!(owner.kind, ResourceKind::Workload);
        assert_eq!(owner.resource, ResourceRef::new("ns-0", "pod-0"));
        assert_eq!(owner.labels.get("app"), Some("web"));
    }
    assert_eq!(idx.lookup_address(ip("10.0.0.2")), None);
}

#[test]
fn indexes_service_addresses() {
    let idx = mk_index();
    idx.services()
        .write()
        .apply(mk_service("ns-0", "svc-0", ["10.96.0.10"]));

    let owner = idx
        .lookup_address(ip("10.96.0.10"))
        .expect("service must be indexed");
    assert_eq!(owner.kind, ResourceKind::Service);
    assert_eq!(owner.resource, ResourceRef::new("ns-0", "svc-0"));
}

#[test]
fn falls_back_to_singular_addresses() {
    let idx = mk_index();

    let mut pod = mk_pod("ns-0", "pod-0", []);
    pod.status.as_mut().unwrap().pod_ips = None;
    pod.status.as_mut().unwrap().pod_ip = Some("10.0.0.1".to_string());
    idx.pods().write().apply(pod);

    let mut svc = mk_service("ns-0", "svc-0", []);
    svc.spec.as_mut().unwrap().cluster_ip = Some("10.96.0.1".to_string());
    idx.services().write().apply(svc);

    assert!(idx.lookup_address(ip("10.0.0.1")).is_some());
    assert!(idx.lookup_address(ip("10.96.0.1")).is_some());
}

#[test]
fn apply_is_idempotent() {
    let idx = mk_index();
    let pod = mk_pod("ns-0", "pod-0", ["10.0.0.1"]);
    idx.pods().write().apply(pod.clone());
    idx.pods().write().apply(pod);

    assert_eq!(idx.pods().read().len(), 1);
    assert_eq!(
        idx.lookup_address(ip("10.0.0.1")).map(|o| o.resource),
        Some(ResourceRef::new("ns-0", "pod-0"))
    );
}

#[test]
fn update_releases_stale_addresses() {
    let idx = mk_index();
    idx.pods()
        .write()
        .apply(mk_pod("ns-0", "pod-0", ["10.0.0.1"]));
    idx.pods()
        .write()
        .apply(mk_pod("ns-0", "pod-0", ["10.0.0.2"]));

    assert_eq!(idx.lookup_address(ip("10.0.0.1")), None);
    assert!(idx.lookup_address(ip("10.0.0.2")).is_some());
    assert_eq!(idx.pods().read().len(), 1);
}

#[test]
fn update_refreshes_labels() {
    let idx = mk_index();
    idx.pods()
        .write()
        .apply(mk_pod("ns-0", "pod-0", ["10.0.0.1"]));

    let mut pod = mk_pod("ns-0", "pod-0", ["10.0.0.1"]);
    pod.metadata.labels = Some(maplit::btreemap! {
        "app".to_string() => "api".to_string(),
    });
    idx.pods().write().apply(pod);

    let owner = idx.lookup_address(ip("10.0.0.1")).unwrap();
    assert_eq!(owner.labels.get("app"), Some("api"));
}

#[test]
fn delete_removes_addresses() {
    let idx = mk_index();
    idx.services()
        .write()
        .apply(mk_service("ns-0", "svc-0", ["10.96.0.1"]));
    idx.services()
        .write()
        .delete("ns-0".to_string(), "svc-0".to_string());

    assert_eq!(idx.lookup_address(ip("10.96.0.1")), None);
    assert!(idx.services().read().is_empty());

    // Deleting an unknown resource is a no-op.
    idx.services()
        .write()
        .delete("ns-0".to_string(), "svc-1".to_string());
}

#[test]
fn pods_are_probed_before_services() {
    let idx = mk_index();
    idx.services()
        .write()
        .apply(mk_service("ns-0", "svc-0", ["10.0.0.1"]));
    idx.pods()
        .write()
        .apply(mk_pod("ns-1", "pod-0", ["10.0.0.1"]));

    let owner = idx.lookup_address(ip("10.0.0.1")).unwrap();
    assert_eq!(owner.kind, ResourceKind::Workload);

    idx.pods()
        .write()
        .delete("ns-1".to_string(), "pod-0".to_string());
    let owner = idx.lookup_address(ip("10.0.0.1")).unwrap();
    assert_eq!(owner.kind, ResourceKind::Service);
}

#[test]
fn reused_address_resolves_to_latest_claimant() {
    let idx = mk_index();
    idx.pods()
        .write()
        .apply(mk_pod("ns-0", "pod-0", ["10.0.0.1"]));
    idx.pods()
        .write()
        .apply(mk_pod("ns-1", "pod-1", ["10.0.0.1"]));

    assert_eq!(
        idx.lookup_address(ip("10.0.0.1")).map(|o| o.resource),
        Some(ResourceRef::new("ns-1", "pod-1"))
    );

    // Once the newer claimant releases the address, the older claim is visible again.
    idx.pods()
        .write()
        .delete("ns-1".to_string(), "pod-1".to_string());
    assert_eq!(
        idx.lookup_address(ip("10.0.0.1")).map(|o| o.resource),
        Some(ResourceRef::new("ns-0", "pod-0"))
    );

    idx.pods()
        .write()
        .apply(mk_pod("ns-0", "pod-0", ["10.0.0.2"]));
    assert_eq!(idx.lookup_address(ip("10.0.0.1")), None);
}

#[test]
fn host_network_pods_are_not_indexed() {
    let idx = mk_index();
    let mut pod = mk_pod("kube-system", "kube-proxy", ["192.168.1.10"]);
    pod.spec.as_mut().unwrap().host_network = Some(true);
    idx.pods().write().apply(pod);

    assert_eq!(idx.lookup_address(ip("192.168.1.10")), None);
}

#[test]
fn terminated_pods_release_addresses() {
    let idx = mk_index();
    idx.pods()
        .write()
        .apply(mk_pod("ns-0", "job-0", ["10.0.0.1"]));

    let mut pod = mk_pod("ns-0", "job-0", ["10.0.0.1"]);
    pod.status.as_mut().unwrap().phase = Some("Succeeded".to_string());
    idx.pods().write().apply(pod);

    assert_eq!(idx.lookup_address(ip("10.0.0.1")), None);
    assert!(idx.pods().read().is_empty());
}

#[test]
fn skips_unassigned_and_invalid_addresses() {
    let idx = mk_index();
    idx.services()
        .write()
        .apply(mk_service("ns-0", "headless", ["None"]));
    idx.services()
        .write()
        .apply(mk_service("ns-0", "svc-0", ["", "not-an-ip", "10.96.0.1"]));

    assert_eq!(idx.services().read().len(), 1);
    assert!(idx.lookup_address(ip("10.96.0.1")).is_some());
}

#[test]
fn skips_resources_without_namespace() {
    let idx = mk_index();
    let mut pod = mk_pod("ns-0", "pod-0", ["10.0.0.1"]);
    pod.metadata.namespace = None;
    idx.pods().write().apply(pod);

    assert!(idx.pods().read().is_empty());
}

#[test]
fn reports_addresses_of_resource() {
    let idx = mk_index();
    idx.pods()
        .write()
        .apply(mk_pod("ns-0", "pod-0", ["10.0.0.1", "fd00::1"]));

    let pods = idx.pods().read();
    let mut addrs = pods
        .addrs_of(&ResourceRef::new("ns-0", "pod-0"))
        .collect::<Vec<_>>();
    addrs.sort();
    assert_eq!(addrs, vec![ip("10.0.0.1"), ip("fd00::1")]);
}
