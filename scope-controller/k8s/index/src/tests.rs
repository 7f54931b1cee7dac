use crate::{metrics, ClusterInfo, ScopeIndex, ScopeMetrics, SharedIndex};
use kubert::index::IndexNamespacedResource;
use maplit::btreemap;
use mesh_scope_core::{host::Name, MeshContext, OutboundTrafficPolicy, ScopeLookup, SidecarScope};
use mesh_scope_k8s_api::{
    self as k8s,
    labels::{Labels, WorkloadSelector},
    networking::{
        destination_rule::{DestinationRule, DestinationRuleSpec},
        sidecar::{self, EgressListener, OutboundTrafficMode, Sidecar, SidecarSpec},
        virtual_service::{
            Destination, HttpRoute, RouteDestination, VirtualService, VirtualServiceSpec,
        },
    },
    EXPORT_TO_ANNOTATION,
};
use prometheus_client::registry::Registry;
use std::sync::Arc;

struct TestConfig {
    index: SharedIndex,
    registry: Registry,
}

impl Default for TestConfig {
    fn default() -> Self {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .try_init()
            .ok();

        let cluster = ClusterInfo {
            dns_domain: "cluster.local".to_string(),
            outbound_traffic_policy: Some(OutboundTrafficPolicy::AllowAny),
        };
        let mut registry = Registry::default();
        let metrics = ScopeMetrics::register(&mut registry);
        let index = ScopeIndex::shared(Arc::new(cluster), metrics);
        metrics::register(&mut registry, index.clone());
        Self { index, registry }
    }
}

fn mk_meta(ns: &str, name: &str) -> k8s::ObjectMeta {
    k8s::ObjectMeta {
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn mk_service(ns: &str, name: &str, ports: &[i32]) -> k8s::Service {
    k8s::Service {
        metadata: mk_meta(ns, name),
        spec: Some(k8s::ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|&port| k8s::ServicePort {
                        port,
                        name: Some(format!("http-{port}")),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_egress(port: Option<u32>, hosts: &[&str]) -> EgressListener {
    EgressListener {
        port: port.map(|number| sidecar::Port {
            number,
            protocol: "HTTP".to_string(),
            name: format!("http-{number}"),
        }),
        bind: None,
        capture_mode: None,
        hosts: hosts.iter().map(|h| h.to_string()).collect(),
    }
}

fn mk_sidecar(
    ns: &str,
    name: &str,
    selector: Option<WorkloadSelector>,
    egress: Vec<EgressListener>,
) -> Sidecar {
    Sidecar {
        metadata: mk_meta(ns, name),
        spec: SidecarSpec {
            workload_selector: selector,
            ingress: vec![],
            egress,
            outbound_traffic_policy: None,
        },
    }
}

fn mk_virtual_service(ns: &str, name: &str, hosts: &[&str], dsts: &[&str]) -> VirtualService {
    VirtualService {
        metadata: mk_meta(ns, name),
        spec: VirtualServiceSpec {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            gateways: vec![],
            export_to: vec![],
            http: vec![HttpRoute {
                name: None,
                route: dsts
                    .iter()
                    .map(|host| RouteDestination {
                        destination: Destination {
                            host: host.to_string(),
                            subset: None,
                            port: None,
                        },
                        weight: None,
                    })
                    .collect(),
                mirror: None,
            }],
            tcp: vec![],
            tls: vec![],
        },
    }
}

fn mk_destination_rule(ns: &str, name: &str, host: &str, export_to: &[&str]) -> DestinationRule {
    DestinationRule {
        metadata: mk_meta(ns, name),
        spec: DestinationRuleSpec {
            host: host.to_string(),
            export_to: export_to.iter().map(|e| e.to_string()).collect(),
            subsets: vec![],
            traffic_policy: None,
        },
    }
}

fn hostnames(scope: &SidecarScope) -> Vec<(String, String)> {
    scope
        .services()
        .iter()
        .map(|svc| (svc.hostname.to_string(), svc.namespace().to_string()))
        .collect()
}

#[test]
fn default_scope_respects_export_to() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));
    let mut private = mk_service("ns2", "b", &[80]);
    private.metadata.annotations = Some(btreemap! {
        EXPORT_TO_ANNOTATION.to_string() => ".".to_string(),
    });
    test.index.write().apply(private);

    let scope = test.index.write().scope_for("ns1", &Labels::default());
    assert!(scope.sidecar().is_none());
    assert_eq!(
        hostnames(&scope),
        vec![("a.ns1.svc.cluster.local".to_string(), "ns1".to_string())]
    );
    assert_eq!(
        scope.outbound_traffic_policy(),
        Some(OutboundTrafficPolicy::AllowAny)
    );

    let scope = test.index.write().scope_for("ns2", &Labels::default());
    assert_eq!(scope.services().len(), 2);
    assert!(scope.depends_on_namespace("ns1"));
    assert!(scope.depends_on_namespace("ns2"));
}

#[test]
fn selects_sidecar_by_workload_labels() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));
    test.index.write().apply(mk_service("ns2", "b", &[80]));
    test.index.write().apply(mk_sidecar(
        "ns1",
        "default",
        None,
        vec![mk_egress(None, &["./*"])],
    ));
    test.index.write().apply(mk_sidecar(
        "ns1",
        "reviews",
        Some(WorkloadSelector::from_iter(Some(("app", "reviews")))),
        vec![mk_egress(None, &["ns2/*"])],
    ));

    let scope = test
        .index
        .write()
        .scope_for("ns1", &Labels::from_iter(vec![("app", "reviews")]));
    assert_eq!(scope.sidecar().map(|s| s.name.as_str()), Some("reviews"));
    assert_eq!(
        hostnames(&scope),
        vec![("b.ns2.svc.cluster.local".to_string(), "ns2".to_string())]
    );

    let scope = test
        .index
        .write()
        .scope_for("ns1", &Labels::from_iter(vec![("app", "ratings")]));
    assert_eq!(scope.sidecar().map(|s| s.name.as_str()), Some("default"));
    assert_eq!(
        hostnames(&scope),
        vec![("a.ns1.svc.cluster.local".to_string(), "ns1".to_string())]
    );
    assert!(!scope.depends_on_namespace("ns2"));
}

#[test]
fn first_default_sidecar_wins() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));
    test.index.write().apply(mk_sidecar(
        "ns1",
        "z-default",
        None,
        vec![mk_egress(None, &["*/*"])],
    ));
    test.index.write().apply(mk_sidecar(
        "ns1",
        "a-default",
        None,
        vec![mk_egress(None, &["ns2/*"])],
    ));

    let scope = test.index.write().scope_for("ns1", &Labels::default());
    assert_eq!(scope.sidecar().map(|s| s.name.as_str()), Some("a-default"));
    assert!(scope.services().is_empty());
}

#[test]
fn ignores_invalid_sidecars() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));
    for sidecar in [
        mk_sidecar("ns1", "empty", None, vec![]),
        mk_sidecar(
            "ns1",
            "catch-all-first",
            None,
            vec![mk_egress(None, &["./*"]), mk_egress(Some(80), &["./*"])],
        ),
        mk_sidecar("ns1", "bad-host", None, vec![mk_egress(None, &["a.com"])]),
        mk_sidecar(
            "ns1",
            "bad-port",
            None,
            vec![mk_egress(Some(70000), &["./*"])],
        ),
    ] {
        test.index.write().apply(sidecar);
    }

    let scope = test.index.write().scope_for("ns1", &Labels::default());
    assert!(scope.sidecar().is_none(), "invalid sidecars must be ignored");
    assert_eq!(scope.services().len(), 1);
}

#[test]
fn memoizes_scopes() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));

    let first = test.index.write().scope_for("ns1", &Labels::default());
    let second = test.index.write().scope_for("ns1", &Labels::default());
    assert!(Arc::ptr_eq(&first, &second));

    // A sidecar in another namespace does not affect this namespace's scope.
    test.index.write().apply(mk_sidecar(
        "ns2",
        "default",
        None,
        vec![mk_egress(None, &["./*"])],
    ));
    let third = test.index.write().scope_for("ns1", &Labels::default());
    assert!(Arc::ptr_eq(&first, &third));

    // Mesh changes invalidate every scope.
    test.index.write().apply(mk_service("ns1", "b", &[80]));
    let fourth = test.index.write().scope_for("ns1", &Labels::default());
    assert!(!Arc::ptr_eq(&first, &fourth));
    assert_eq!(fourth.services().len(), 2);

    // Sidecar changes invalidate the namespace's scopes.
    test.index.write().apply(mk_sidecar(
        "ns1",
        "default",
        None,
        vec![mk_egress(None, &["ns2/*"])],
    ));
    let fifth = test.index.write().scope_for("ns1", &Labels::default());
    assert!(fifth.services().is_empty());
    <ScopeIndex as IndexNamespacedResource<Sidecar>>::delete(
        &mut test.index.write(),
        "ns1".to_string(),
        "default".to_string(),
    );
    let sixth = test.index.write().scope_for("ns1", &Labels::default());
    assert!(sixth.sidecar().is_none());
    assert_eq!(sixth.services().len(), 2);
}

#[test]
fn serves_cached_scopes_under_the_read_lock() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));
    let labels = Labels::default();

    assert!(test.index.read().cached_scope("ns1", &labels).is_none());
    let built = ScopeIndex::lookup(&test.index, "ns1", &labels);

    // Cache hits never take the write lock, so they proceed alongside other readers.
    let reader = test.index.read();
    let cached = reader
        .cached_scope("ns1", &labels)
        .expect("scope must be cached");
    assert!(Arc::ptr_eq(&built, &cached));
    let concurrent = std::thread::scope(|s| {
        s.spawn(|| ScopeIndex::lookup(&test.index, "ns1", &labels))
            .join()
            .expect("lookup must not panic")
    });
    assert!(Arc::ptr_eq(&built, &concurrent));
    drop(reader);

    // Misses build the scope under the write lock.
    let other = ScopeIndex::lookup(&test.index, "ns2", &labels);
    assert_eq!(other.namespace(), "ns2");
}

#[test]
fn infers_services_from_routing_rules() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "frontend", &[80]));
    test.index.write().apply(mk_service("ns2", "backend", &[8080]));
    test.index.write().apply(mk_service("ns3", "backend", &[8080]));
    // Destinations are qualified relative to the rule's namespace.
    test.index.write().apply(mk_virtual_service(
        "ns1",
        "frontend",
        &["frontend"],
        &["backend.ns3.svc.cluster.local", "missing"],
    ));
    test.index.write().apply(mk_sidecar(
        "ns1",
        "default",
        None,
        vec![mk_egress(None, &["./*"])],
    ));

    let scope = test.index.write().scope_for("ns1", &Labels::default());
    assert_eq!(scope.egress_listeners()[0].routing_rules().len(), 1);
    assert_eq!(
        hostnames(&scope),
        vec![
            ("frontend.ns1.svc.cluster.local".to_string(), "ns1".to_string()),
            ("backend.ns3.svc.cluster.local".to_string(), "ns3".to_string()),
        ]
    );
    assert_eq!(
        scope.namespace_dependencies().iter().collect::<Vec<_>>(),
        vec!["ns1", "ns3"]
    );
}

#[test]
fn resolves_policies_by_namespace_precedence() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns2", "a", &[80]));
    test.index
        .write()
        .apply(mk_destination_rule("ns2", "svc-ns", "a", &[]));
    test.index
        .write()
        .apply(mk_destination_rule("ns3", "other", "*.svc.cluster.local", &[]));

    let index = test.index.read();
    let svc = index.mesh().services("ns1").remove(0);
    let policy = index.mesh().resolve_policy("ns1", &svc).unwrap();
    assert_eq!(policy.name, "svc-ns");
    drop(index);

    // A policy in the proxy's own namespace wins over the service's.
    test.index
        .write()
        .apply(mk_destination_rule("ns1", "local", "*.ns2.svc.cluster.local", &[]));
    let index = test.index.read();
    let policy = index.mesh().resolve_policy("ns1", &svc).unwrap();
    assert_eq!(policy.name, "local");

    // Rules that are not exported to the proxy's namespace are ignored.
    assert_eq!(
        index.mesh().resolve_policy("ns4", &svc).map(|p| p.name.clone()),
        Some("svc-ns".to_string())
    );
    drop(index);
    test.index
        .write()
        .apply(mk_destination_rule("ns2", "svc-ns", "a", &["."]));
    let index = test.index.read();
    assert_eq!(
        index.mesh().resolve_policy("ns4", &svc).map(|p| p.name.clone()),
        Some("local".to_string())
    );
}

#[test]
fn scope_policies() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));
    test.index.write().apply(mk_service("ns1", "b", &[80]));
    test.index
        .write()
        .apply(mk_destination_rule("ns1", "a", "a", &[]));

    let scope = test.index.write().scope_for("ns1", &Labels::default());
    let a = Name::from("a.ns1.svc.cluster.local");
    let b = Name::from("b.ns1.svc.cluster.local");
    assert_eq!(scope.policy(&a).map(|p| p.name.as_str()), Some("a"));
    assert!(scope.policy(&b).is_none());
    assert!(Some(&*scope).policy(&a).is_some());
    assert!(None::<&SidecarScope>.policy(&a).is_none());
}

#[test]
fn sidecar_outbound_traffic_policy() {
    let test = TestConfig::default();
    let mut resource = mk_sidecar("ns1", "default", None, vec![mk_egress(None, &["./*"])]);
    resource.spec.outbound_traffic_policy = Some(sidecar::OutboundTrafficPolicy {
        mode: OutboundTrafficMode::RegistryOnly,
    });
    test.index.write().apply(resource);

    let scope = test.index.write().scope_for("ns1", &Labels::default());
    assert_eq!(
        scope.outbound_traffic_policy(),
        Some(OutboundTrafficPolicy::RegistryOnly)
    );
}

#[test]
fn deleted_services_leave_the_mesh() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));
    test.index.write().apply(mk_service("ns2", "a", &[80]));
    let hostname = Name::from("a.ns1.svc.cluster.local");
    assert!(test.index.read().mesh().services_by_hostname(&hostname).is_some());

    <ScopeIndex as IndexNamespacedResource<k8s::Service>>::delete(
        &mut test.index.write(),
        "ns1".to_string(),
        "a".to_string(),
    );
    assert!(test.index.read().mesh().services_by_hostname(&hostname).is_none());
    assert_eq!(test.index.read().mesh().services("ns1").len(), 1);
}

#[test]
fn reports_metrics() {
    let test = TestConfig::default();
    test.index.write().apply(mk_service("ns1", "a", &[80]));
    test.index.write().apply(mk_sidecar(
        "ns1",
        "default",
        None,
        vec![mk_egress(None, &["./*"])],
    ));
    test.index.write().scope_for("ns1", &Labels::default());
    test.index.write().scope_for("ns1", &Labels::default());
    test.index.write().scope_for("ns2", &Labels::default());

    let mut text = String::new();
    prometheus_client::encoding::text::encode(&mut text, &test.registry).unwrap();
    for line in [
        "scope_builds_total{kind=\"sidecar\"} 1",
        "scope_builds_total{kind=\"default\"} 1",
        "scope_cache_hits_total 1",
        "service_index_size 1",
        "scope_cache_size 2",
        "sidecar_index_size{namespace=\"ns1\"} 1",
    ] {
        assert!(text.contains(line), "missing {line:?} in:\n{text}");
    }
}
