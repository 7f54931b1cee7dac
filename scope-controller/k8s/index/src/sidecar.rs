use crate::{ClusterInfo, Error, MeshIndex, ScopeMetrics};
use ahash::AHashMap as HashMap;
use kubert::index::IndexNamespacedResource;
use mesh_scope_core::{
    sidecar::{CaptureMode, EgressListener, IngressListener, ListenerPort},
    OutboundTrafficPolicy, Protocol, Sidecar, SidecarScope,
};
use mesh_scope_k8s_api::{
    labels::{Labels, WorkloadSelector},
    networking::{sidecar as k8s, DestinationRule, Sidecar as KubeSidecar, VirtualService},
    ResourceExt, Service as KubeService,
};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

/// Indexes `Sidecar` resources and memoizes the scopes built from them.
#[derive(Debug)]
pub struct ScopeIndex {
    mesh: MeshIndex,
    namespaces: HashMap<String, NamespaceSidecars>,
    scopes: HashMap<ScopeKey, Arc<SidecarScope>>,
    metrics: ScopeMetrics,
}

pub type SharedIndex = Arc<RwLock<ScopeIndex>>;

/// The sidecars in a namespace, ordered by name.
#[derive(Debug, Default)]
struct NamespaceSidecars {
    by_name: BTreeMap<String, SidecarEntry>,
}

#[derive(Debug)]
struct SidecarEntry {
    selector: Option<WorkloadSelector>,
    sidecar: Arc<Sidecar>,
}

/// Identifies a memoized scope. Default scopes have no sidecar.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ScopeKey {
    namespace: String,
    sidecar: Option<String>,
}

// === impl ScopeIndex ===

impl ScopeIndex {
    pub fn new(cluster_info: Arc<ClusterInfo>, metrics: ScopeMetrics) -> Self {
        Self {
            mesh: MeshIndex::new(cluster_info),
            namespaces: HashMap::default(),
            scopes: HashMap::default(),
            metrics,
        }
    }

    pub fn shared(cluster_info: Arc<ClusterInfo>, metrics: ScopeMetrics) -> SharedIndex {
        Arc::new(RwLock::new(Self::new(cluster_info, metrics)))
    }

    pub fn mesh(&self) -> &MeshIndex {
        &self.mesh
    }

    /// Returns the scope for a workload in `namespace` with the given labels.
    ///
    /// Cached scopes are served under the read lock, so concurrent lookups only contend when a
    /// scope has to be built.
    pub fn lookup(index: &SharedIndex, namespace: &str, labels: &Labels) -> Arc<SidecarScope> {
        if let Some(scope) = index.read().cached_scope(namespace, labels) {
            return scope;
        }
        index.write().scope_for(namespace, labels)
    }

    /// Returns the memoized scope for a workload, if one has been built.
    pub fn cached_scope(&self, namespace: &str, labels: &Labels) -> Option<Arc<SidecarScope>> {
        let (key, _) = self.select(namespace, labels);
        let scope = self.scopes.get(&key)?.clone();
        self.metrics.cache_hit();
        Some(scope)
    }

    /// Returns the scope for a workload in `namespace` with the given labels, building it if
    /// necessary.
    ///
    /// The first sidecar (by name) whose workload selector matches the labels applies; otherwise
    /// the namespace's default sidecar, if any. Without either, the namespace's default scope is
    /// returned.
    pub fn scope_for(&mut self, namespace: &str, labels: &Labels) -> Arc<SidecarScope> {
        if let Some(scope) = self.cached_scope(namespace, labels) {
            return scope;
        }

        let (key, sidecar) = self.select(namespace, labels);
        tracing::debug!(ns = namespace, sidecar = ?key.sidecar, "building scope");
        self.metrics.build(sidecar.is_some());
        let scope = Arc::new(SidecarScope::build(&self.mesh, namespace, sidecar));
        self.scopes.insert(key, scope.clone());
        scope
    }

    fn select(&self, namespace: &str, labels: &Labels) -> (ScopeKey, Option<Arc<Sidecar>>) {
        let sidecar = self
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.select(labels))
            .cloned();
        let key = ScopeKey {
            namespace: namespace.to_string(),
            sidecar: sidecar.as_ref().map(|s| s.name.clone()),
        };
        (key, sidecar)
    }

    pub(crate) fn namespace_sizes(&self) -> impl Iterator<Item = (&str, usize)> {
        self.namespaces
            .iter()
            .map(|(ns, sidecars)| (ns.as_str(), sidecars.by_name.len()))
    }

    pub(crate) fn cached_scopes(&self) -> usize {
        self.scopes.len()
    }

    fn invalidate_all(&mut self) {
        if !self.scopes.is_empty() {
            tracing::debug!(scopes = self.scopes.len(), "invalidating all scopes");
            self.scopes.clear();
        }
    }

    fn invalidate_namespace(&mut self, namespace: &str) {
        self.scopes.retain(|key, _| key.namespace != namespace);
    }
}

impl IndexNamespacedResource<KubeSidecar> for ScopeIndex {
    fn apply(&mut self, resource: KubeSidecar) {
        let ns = resource.namespace().unwrap_or_default();
        let name = resource.name_unchecked();
        let entry = match convert(&resource) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::error!(%error, %ns, %name, "ignoring invalid Sidecar");
                return;
            }
        };
        tracing::debug!(%ns, %name, "indexing sidecar");

        let sidecars = self.namespaces.entry(ns.clone()).or_default();
        sidecars.by_name.insert(name, entry);
        sidecars.warn_on_conflicting_defaults(&ns);
        self.invalidate_namespace(&ns);
    }

    fn delete(&mut self, namespace: String, name: String) {
        if let Some(sidecars) = self.namespaces.get_mut(&namespace) {
            sidecars.by_name.remove(&name);
            if sidecars.by_name.is_empty() {
                self.namespaces.remove(&namespace);
            }
        }
        self.invalidate_namespace(&namespace);
    }
}

impl IndexNamespacedResource<KubeService> for ScopeIndex {
    fn apply(&mut self, resource: KubeService) {
        self.mesh.apply(resource);
        self.invalidate_all();
    }

    fn delete(&mut self, namespace: String, name: String) {
        <MeshIndex as IndexNamespacedResource<KubeService>>::delete(
            &mut self.mesh,
            namespace,
            name,
        );
        self.invalidate_all();
    }
}

impl IndexNamespacedResource<VirtualService> for ScopeIndex {
    fn apply(&mut self, resource: VirtualService) {
        self.mesh.apply(resource);
        self.invalidate_all();
    }

    fn delete(&mut self, namespace: String, name: String) {
        <MeshIndex as IndexNamespacedResource<VirtualService>>::delete(
            &mut self.mesh,
            namespace,
            name,
        );
        self.invalidate_all();
    }
}

impl IndexNamespacedResource<DestinationRule> for ScopeIndex {
    fn apply(&mut self, resource: DestinationRule) {
        self.mesh.apply(resource);
        self.invalidate_all();
    }

    fn delete(&mut self, namespace: String, name: String) {
        <MeshIndex as IndexNamespacedResource<DestinationRule>>::delete(
            &mut self.mesh,
            namespace,
            name,
        );
        self.invalidate_all();
    }
}

// === impl NamespaceSidecars ===

impl NamespaceSidecars {
    fn select(&self, labels: &Labels) -> Option<&Arc<Sidecar>> {
        let mut selected = self.by_name.values().filter_map(|entry| {
            let selector = entry.selector.as_ref()?;
            selector.matches(labels).then_some(&entry.sidecar)
        });
        selected.next().or_else(|| self.default_sidecar())
    }

    /// The first sidecar, by name, without a workload selector.
    fn default_sidecar(&self) -> Option<&Arc<Sidecar>> {
        self.by_name
            .values()
            .find(|entry| entry.selector.is_none())
            .map(|entry| &entry.sidecar)
    }

    fn warn_on_conflicting_defaults(&self, ns: &str) {
        let mut defaults = self
            .by_name
            .iter()
            .filter(|(_, entry)| entry.selector.is_none())
            .map(|(name, _)| name.as_str());
        if let Some(default) = defaults.next() {
            for ignored in defaults {
                tracing::warn!(
                    %ns,
                    %default,
                    %ignored,
                    "multiple sidecars without a workload selector; only the first applies",
                );
            }
        }
    }
}

// === conversion ===

fn convert(resource: &KubeSidecar) -> Result<SidecarEntry, Error> {
    let namespace = resource.namespace().ok_or(Error::MissingNamespace)?;
    let spec = &resource.spec;

    if spec.egress.is_empty() {
        return Err(Error::EmptyEgress);
    }
    let egress = spec
        .egress
        .iter()
        .map(convert_egress)
        .collect::<Result<Vec<_>, _>>()?;
    if egress[..egress.len() - 1].iter().any(|l| l.port.is_none()) {
        return Err(Error::CatchAllNotLast);
    }

    let ingress = spec
        .ingress
        .iter()
        .map(|l| -> Result<_, Error> {
            Ok(IngressListener {
                port: convert_port(&l.port)?,
                bind: l.bind.clone().unwrap_or_default(),
                capture_mode: convert_capture_mode(l.capture_mode),
                default_endpoint: l.default_endpoint.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let outbound_traffic_policy = spec
        .outbound_traffic_policy
        .as_ref()
        .map(|p| match p.mode {
            k8s::OutboundTrafficMode::RegistryOnly => OutboundTrafficPolicy::RegistryOnly,
            k8s::OutboundTrafficMode::AllowAny => OutboundTrafficPolicy::AllowAny,
        });

    let sidecar = Sidecar {
        name: resource.name_unchecked(),
        namespace,
        ingress,
        egress,
        outbound_traffic_policy,
    };
    Ok(SidecarEntry {
        selector: spec.workload_selector.clone(),
        sidecar: Arc::new(sidecar),
    })
}

fn convert_egress(listener: &k8s::EgressListener) -> Result<EgressListener, Error> {
    if let Some(host) = listener.hosts.iter().find(|h| !h.contains('/')) {
        return Err(Error::InvalidEgressHost(host.clone()));
    }
    let port = listener.port.as_ref().map(convert_port).transpose()?;
    Ok(EgressListener {
        port,
        bind: listener.bind.clone().unwrap_or_default(),
        capture_mode: convert_capture_mode(listener.capture_mode),
        hosts: listener.hosts.clone(),
    })
}

fn convert_port(port: &k8s::Port) -> Result<ListenerPort, Error> {
    let number = u16::try_from(port.number).map_err(|_| Error::InvalidPort(port.number.into()))?;
    Ok(ListenerPort {
        number,
        protocol: Protocol::parse(&port.protocol),
        name: port.name.clone(),
    })
}

fn convert_capture_mode(mode: Option<k8s::CaptureMode>) -> CaptureMode {
    match mode {
        None | Some(k8s::CaptureMode::Default) => CaptureMode::Default,
        Some(k8s::CaptureMode::Iptables) => CaptureMode::Iptables,
        Some(k8s::CaptureMode::None) => CaptureMode::None,
    }
}
