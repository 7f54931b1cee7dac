use crate::{
    host::Name,
    mesh::{MeshContext, MESH_GATEWAY},
    routing::RoutingRule,
    service::{Protocol, Service},
    sidecar::EgressListener,
};
use ahash::AHashMap as HashMap;
use std::{collections::BTreeMap, sync::Arc};

/// Selects imports in every namespace.
pub const WILDCARD_NAMESPACE: &str = "*";

/// Selects imports in the scope's own namespace.
pub const CURRENT_NAMESPACE: &str = ".";

/// The services and routing rules visible through a single egress listener.
#[derive(Clone, Debug)]
pub struct EgressListenerScope {
    /// Unset for the synthesized catch-all listener of a default scope.
    listener: Option<EgressListener>,
    imports: HostImports,
    services: Vec<Arc<Service>>,
    routing_rules: Vec<Arc<RoutingRule>>,
}

/// An egress listener's host imports, grouped by namespace selector.
///
/// Namespace selectors are either a literal namespace or [`WILDCARD_NAMESPACE`]; the current
/// namespace token is resolved when the imports are parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostImports(BTreeMap<String, Vec<Name>>);

/// Describes which group of imports selected a resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImportMatch {
    /// Selected by an import in the resource's own namespace.
    Namespace,

    /// Selected by a wildcard-namespace import.
    Wildcard,

    Unmatched,
}

// === impl EgressListenerScope ===

impl EgressListenerScope {
    pub(crate) fn new<M>(mesh: &M, namespace: &str, listener: EgressListener) -> Self
    where
        M: MeshContext + ?Sized,
    {
        let imports = HostImports::parse(listener.hosts.iter().map(String::as_str), namespace);
        let routing_rules =
            imports.select_routing_rules(mesh.routing_rules(namespace, &[MESH_GATEWAY]));
        let port = listener
            .port
            .as_ref()
            .filter(|p| p.number != 0 && p.protocol != Protocol::HttpProxy)
            .map(|p| p.number);
        let services = imports.select_services(mesh.services(namespace), namespace, port);
        Self {
            listener: Some(listener),
            imports,
            services,
            routing_rules,
        }
    }

    /// Builds the listener of a default scope, which imports everything visible to `namespace`.
    pub(crate) fn catch_all<M>(mesh: &M, namespace: &str) -> Self
    where
        M: MeshContext + ?Sized,
    {
        Self {
            listener: None,
            imports: HostImports::catch_all(),
            services: mesh.services(namespace),
            routing_rules: mesh.routing_rules(namespace, &[MESH_GATEWAY]),
        }
    }

    /// The raw listener, or `None` for the synthesized catch-all listener.
    pub fn listener(&self) -> Option<&EgressListener> {
        self.listener.as_ref()
    }

    pub fn imports(&self) -> &HostImports {
        &self.imports
    }

    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    pub fn routing_rules(&self) -> &[Arc<RoutingRule>] {
        &self.routing_rules
    }

    /// Indicates whether the listener serves the given port (or, for unix domain sockets, the
    /// given bind address).
    pub fn matches_port(&self, port: u16, bind: &str) -> bool {
        let listener = match self.listener.as_ref() {
            Some(listener) => listener,
            None => return true,
        };
        match listener.port.as_ref() {
            None => true,
            Some(p) if p.number != port => false,
            Some(_) if port == 0 => listener.bind == bind,
            Some(_) => true,
        }
    }
}

// === impl HostImports ===

impl HostImports {
    /// Parses `namespace/host` imports, resolving the current-namespace token to `namespace`.
    ///
    /// Malformed imports are ignored.
    pub fn parse<'h>(hosts: impl IntoIterator<Item = &'h str>, namespace: &str) -> Self {
        let mut imports = BTreeMap::<String, Vec<Name>>::new();
        for h in hosts {
            let (ns, host) = match h.split_once('/') {
                Some(parts) => parts,
                None => {
                    tracing::debug!(import = %h, "ignoring import without a namespace");
                    continue;
                }
            };
            let ns = if ns == CURRENT_NAMESPACE { namespace } else { ns };
            imports.entry(ns.to_string()).or_default().push(host.into());
        }
        Self(imports)
    }

    /// Imports every host in every namespace.
    pub fn catch_all() -> Self {
        let mut imports = BTreeMap::new();
        imports.insert(WILDCARD_NAMESPACE.to_string(), vec![Name::wildcard()]);
        Self(imports)
    }

    pub fn get(&self, selector: &str) -> &[Name] {
        self.0.get(selector).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Name])> {
        self.0.iter().map(|(ns, hosts)| (ns.as_str(), hosts.as_slice()))
    }

    /// Finds the first import matching a resource in `namespace`, checking imports from that
    /// namespace before wildcard-namespace imports.
    pub fn lookup(&self, namespace: &str, mut matches: impl FnMut(&Name) -> bool) -> ImportMatch {
        if self.get(namespace).iter().any(&mut matches) {
            return ImportMatch::Namespace;
        }
        if self.get(WILDCARD_NAMESPACE).iter().any(&mut matches) {
            return ImportMatch::Wildcard;
        }
        ImportMatch::Unmatched
    }

    /// Selects the routing rules with any host matched by an import, preserving their order.
    ///
    /// Rule hosts may themselves be wildcards, so an import selects a rule when the two overlap.
    /// A rule with several hosts is selected as a whole when any one of its hosts is imported.
    fn select_routing_rules(&self, rules: Vec<Arc<RoutingRule>>) -> Vec<Arc<RoutingRule>> {
        rules
            .into_iter()
            .filter(|rule| {
                let selected = self.lookup(&rule.namespace, |import| {
                    rule.hosts.iter().any(|host| import.overlaps(host))
                });
                selected != ImportMatch::Unmatched
            })
            .collect()
    }

    /// Selects the imported services. When `port` is set, only services exposing that port are
    /// selected, and each is narrowed to that single port.
    ///
    /// When a hostname is imported from several namespaces, only the services from one namespace
    /// are kept: `namespace` if possible, else the alphabetically first, regardless of the order
    /// in which services are provided.
    fn select_services(
        &self,
        services: Vec<Arc<Service>>,
        namespace: &str,
        port: Option<u16>,
    ) -> Vec<Arc<Service>> {
        let imported = services
            .into_iter()
            .filter_map(|svc| {
                let selected = self.lookup(svc.namespace(), |import| import.matches(&svc.hostname));
                if selected == ImportMatch::Unmatched {
                    return None;
                }
                match port {
                    None => Some(svc),
                    Some(port) => svc.narrowed_to(port).map(Arc::new),
                }
            })
            .collect::<Vec<_>>();

        let mut namespaces = HashMap::<&Name, &str>::with_capacity(imported.len());
        for svc in &imported {
            let ns = namespaces.entry(&svc.hostname).or_insert(svc.namespace());
            if *ns != namespace && (svc.namespace() == namespace || svc.namespace() < *ns) {
                *ns = svc.namespace();
            }
        }

        imported
            .iter()
            .filter(|svc| namespaces.get(&svc.hostname) == Some(&svc.namespace()))
            .cloned()
            .collect()
    }
}
