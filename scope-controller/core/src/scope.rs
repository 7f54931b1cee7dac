use crate::{
    host::Name,
    mesh::{MeshContext, ServicesByNamespace},
    policy::Policy,
    service::Service,
    sidecar::Sidecar,
    traffic::OutboundTrafficPolicy,
};
use ahash::AHashMap as HashMap;
use std::{
    collections::{hash_map::Entry, BTreeSet},
    sync::Arc,
};

mod listener;

pub use self::listener::{
    EgressListenerScope, HostImports, ImportMatch, CURRENT_NAMESPACE, WILDCARD_NAMESPACE,
};

/// The mesh configuration visible to the proxies of a configuration namespace.
///
/// A scope is built from a single snapshot of a [`MeshContext`] and is never modified afterwards;
/// configuration changes produce a new scope. Scopes are shared between all proxies that map to
/// the same namespace and `Sidecar` resource.
#[derive(Clone, Debug)]
pub struct SidecarScope {
    namespace: String,

    /// Unset for the default scope.
    sidecar: Option<Arc<Sidecar>>,

    egress_listeners: Vec<EgressListenerScope>,
    has_custom_inbound_listeners: bool,

    /// The union of services imported by all egress listeners.
    services: Vec<Arc<Service>>,

    /// Policies for each hostname in `services`.
    policies: HashMap<Name, Arc<Policy>>,

    outbound_traffic_policy: Option<OutboundTrafficPolicy>,
    namespace_dependencies: BTreeSet<String>,
}

/// Queries against a scope that may be absent.
///
/// Proxies that could not be mapped to a scope fall back to a conservative behavior for each
/// query.
pub trait ScopeLookup<'s> {
    /// The services in scope. Nothing is in scope without a scope.
    fn services(self) -> &'s [Arc<Service>];

    /// The policy for `hostname`. There is no policy without a scope.
    fn policy(self, hostname: &Name) -> Option<&'s Arc<Policy>>;

    /// The egress listener serving `port`/`bind`. There is no listener without a scope.
    fn egress_listener_for_port(self, port: u16, bind: &str) -> Option<&'s EgressListenerScope>;

    /// Without a scope, a proxy depends on every namespace.
    fn depends_on_namespace(self, namespace: &str) -> bool;

    /// Resolves `hostname` to a service in scope. Without a scope, any service exposing the
    /// hostname is returned.
    fn service_for_hostname(
        self,
        hostname: &Name,
        by_hostname: Option<&'s ServicesByNamespace>,
    ) -> Option<&'s Arc<Service>>;
}

/// Accumulates the service union of an explicit scope.
#[derive(Default)]
struct ServiceUnion {
    services: Vec<Arc<Service>>,
    by_hostname: HashMap<Name, usize>,
    namespaces: BTreeSet<String>,
}

// === impl SidecarScope ===

impl SidecarScope {
    /// Builds the scope for `namespace`, from `sidecar` if the namespace has one.
    pub fn build<M>(mesh: &M, namespace: &str, sidecar: Option<Arc<Sidecar>>) -> Self
    where
        M: MeshContext + ?Sized,
    {
        match sidecar {
            Some(sidecar) => Self::from_sidecar(mesh, namespace, sidecar),
            None => Self::default_for_namespace(mesh, namespace),
        }
    }

    /// Builds a scope with a single catch-all listener that imports every service and routing
    /// rule visible to `namespace`.
    pub fn default_for_namespace<M>(mesh: &M, namespace: &str) -> Self
    where
        M: MeshContext + ?Sized,
    {
        let listener = EgressListenerScope::catch_all(mesh, namespace);
        let services = listener.services().to_vec();

        let mut policies = HashMap::with_capacity(services.len());
        let mut namespace_dependencies = BTreeSet::new();
        for svc in &services {
            if let Some(policy) = mesh.resolve_policy(namespace, svc) {
                policies.insert(svc.hostname.clone(), policy);
            }
            namespace_dependencies.insert(svc.namespace().to_string());
        }

        Self {
            namespace: namespace.to_string(),
            sidecar: None,
            egress_listeners: vec![listener],
            has_custom_inbound_listeners: false,
            services,
            policies,
            outbound_traffic_policy: mesh.outbound_traffic_policy(),
            namespace_dependencies,
        }
    }

    /// Builds a scope from a `Sidecar` resource.
    ///
    /// The sidecar must declare at least one egress listener.
    pub fn from_sidecar<M>(mesh: &M, namespace: &str, sidecar: Arc<Sidecar>) -> Self
    where
        M: MeshContext + ?Sized,
    {
        let egress_listeners = sidecar
            .egress
            .iter()
            .map(|listener| EgressListenerScope::new(mesh, namespace, listener.clone()))
            .collect::<Vec<_>>();

        let mut imported = ServiceUnion::default();
        for listener in &egress_listeners {
            // Services imported by hosts take priority over those inferred from routing rules so
            // that a user may disambiguate a hostname exported by several namespaces.
            for svc in listener.services() {
                imported.insert(svc.clone());
            }

            for rule in listener.routing_rules() {
                for host in rule.destination_hosts() {
                    let by_ns = match mesh.services_by_hostname(host) {
                        Some(by_ns) if !by_ns.is_empty() => by_ns,
                        _ => {
                            tracing::debug!(
                                %host,
                                rule.namespace = %rule.namespace,
                                rule.name = %rule.name,
                                "no service found for routing rule destination",
                            );
                            continue;
                        }
                    };
                    // Prefer the config namespace; otherwise the first namespace alphabetically.
                    if let Some(svc) = by_ns.get(namespace).or_else(|| by_ns.values().next()) {
                        imported.insert(svc.clone());
                    }
                }
            }
        }
        let ServiceUnion {
            services,
            namespaces: namespace_dependencies,
            ..
        } = imported;

        let mut policies = HashMap::with_capacity(services.len());
        for svc in &services {
            if let Some(policy) = mesh.resolve_policy(namespace, svc) {
                policies.insert(svc.hostname.clone(), policy);
            }
        }

        let outbound_traffic_policy = sidecar
            .outbound_traffic_policy
            .or_else(|| mesh.outbound_traffic_policy());

        Self {
            namespace: namespace.to_string(),
            has_custom_inbound_listeners: sidecar.has_ingress(),
            sidecar: Some(sidecar),
            egress_listeners,
            services,
            policies,
            outbound_traffic_policy,
            namespace_dependencies,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The resource that this scope was built from, unless it is a default scope.
    pub fn sidecar(&self) -> Option<&Arc<Sidecar>> {
        self.sidecar.as_ref()
    }

    pub fn egress_listeners(&self) -> &[EgressListenerScope] {
        &self.egress_listeners
    }

    /// Indicates that the sidecar declares its own inbound listeners, so they should not be
    /// derived from the proxy's service instances.
    pub fn has_custom_inbound_listeners(&self) -> bool {
        self.has_custom_inbound_listeners
    }

    pub fn outbound_traffic_policy(&self) -> Option<OutboundTrafficPolicy> {
        self.outbound_traffic_policy
    }

    pub fn namespace_dependencies(&self) -> &BTreeSet<String> {
        &self.namespace_dependencies
    }

    pub fn policies(&self) -> impl Iterator<Item = (&Name, &Arc<Policy>)> {
        self.policies.iter()
    }

    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    pub fn policy(&self, hostname: &Name) -> Option<&Arc<Policy>> {
        self.policies.get(hostname)
    }

    /// Returns the first listener serving `port`, or `bind` for unix domain sockets. A listener
    /// without a port matches any query.
    pub fn egress_listener_for_port(&self, port: u16, bind: &str) -> Option<&EgressListenerScope> {
        self.egress_listeners
            .iter()
            .find(|listener| listener.matches_port(port, bind))
    }

    pub fn depends_on_namespace(&self, namespace: &str) -> bool {
        self.namespace_dependencies.contains(namespace)
    }

    pub fn service_for_hostname(&self, hostname: &Name) -> Option<&Arc<Service>> {
        self.services.iter().find(|svc| svc.hostname == *hostname)
    }
}

// === impl ScopeLookup ===

impl<'s> ScopeLookup<'s> for Option<&'s SidecarScope> {
    fn services(self) -> &'s [Arc<Service>] {
        self.map(SidecarScope::services).unwrap_or_default()
    }

    fn policy(self, hostname: &Name) -> Option<&'s Arc<Policy>> {
        self?.policy(hostname)
    }

    fn egress_listener_for_port(self, port: u16, bind: &str) -> Option<&'s EgressListenerScope> {
        self?.egress_listener_for_port(port, bind)
    }

    fn depends_on_namespace(self, namespace: &str) -> bool {
        self.map_or(true, |scope| scope.depends_on_namespace(namespace))
    }

    fn service_for_hostname(
        self,
        hostname: &Name,
        by_hostname: Option<&'s ServicesByNamespace>,
    ) -> Option<&'s Arc<Service>> {
        match self {
            Some(scope) => scope.service_for_hostname(hostname),
            None => by_hostname?.values().next(),
        }
    }
}

// === impl ServiceUnion ===

impl ServiceUnion {
    /// Adds a service to the union.
    ///
    /// The first service inserted for a hostname wins. When the same hostname is inserted again
    /// from the same namespace, its ports are merged into the existing entry; when it is
    /// inserted from another namespace, it is dropped.
    fn insert(&mut self, svc: Arc<Service>) {
        match self.by_hostname.entry(svc.hostname.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(self.services.len());
                self.namespaces.insert(svc.namespace().to_string());
                self.services.push(svc);
            }
            Entry::Occupied(entry) => {
                let existing = &mut self.services[*entry.get()];
                if existing.namespace() != svc.namespace() {
                    return;
                }
                for port in &svc.ports {
                    if existing.port(port.port).is_none() {
                        // Copy-on-write: the existing entry may be shared with a listener.
                        Arc::make_mut(existing).ports.push(port.clone());
                    }
                }
            }
        }
    }
}
