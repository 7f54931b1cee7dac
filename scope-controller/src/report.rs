use mesh_scope_core::{EgressListenerScope, Service, SidecarScope};
use serde::Serialize;

/// A JSON rendering of a [`SidecarScope`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeReport {
    pub namespace: String,

    /// Unset for the default scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_traffic_policy: Option<String>,

    pub has_custom_inbound_listeners: bool,
    pub egress_listeners: Vec<ListenerReport>,
    pub services: Vec<ServiceReport>,

    /// Ordered by hostname.
    pub policies: Vec<PolicyReport>,

    pub namespace_dependencies: Vec<String>,

    /// The index of the listener serving the requested port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_listener: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub bind: String,

    /// Imports as `namespace/host`, with the current namespace resolved.
    pub hosts: Vec<String>,

    pub services: Vec<String>,

    /// Routing rules as `namespace/name`.
    pub routing_rules: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub hostname: String,
    pub namespace: String,
    pub ports: Vec<PortReport>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortReport {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub port: u16,
    pub protocol: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PolicyReport {
    pub hostname: String,

    /// The policy as `namespace/name`.
    pub policy: String,
}

// === impl ScopeReport ===

impl ScopeReport {
    pub fn new(scope: &SidecarScope, port: Option<(u16, &str)>) -> Self {
        let mut policies = scope
            .policies()
            .map(|(hostname, policy)| PolicyReport {
                hostname: hostname.to_string(),
                policy: format!("{}/{}", policy.namespace, policy.name),
            })
            .collect::<Vec<_>>();
        policies.sort_by(|a, b| a.hostname.cmp(&b.hostname));

        let selected_listener = port.and_then(|(port, bind)| {
            scope
                .egress_listeners()
                .iter()
                .position(|l| l.matches_port(port, bind))
        });

        Self {
            namespace: scope.namespace().to_string(),
            sidecar: scope.sidecar().map(|s| s.name.clone()),
            outbound_traffic_policy: scope.outbound_traffic_policy().map(|p| p.to_string()),
            has_custom_inbound_listeners: scope.has_custom_inbound_listeners(),
            egress_listeners: scope
                .egress_listeners()
                .iter()
                .map(ListenerReport::new)
                .collect(),
            services: scope.services().iter().map(|s| ServiceReport::new(s)).collect(),
            policies,
            namespace_dependencies: scope.namespace_dependencies().iter().cloned().collect(),
            selected_listener,
        }
    }
}

// === impl ListenerReport ===

impl ListenerReport {
    fn new(listener: &EgressListenerScope) -> Self {
        let raw = listener.listener();
        Self {
            port: raw.and_then(|l| l.port.as_ref()).map(|p| p.number),
            bind: raw.map(|l| l.bind.clone()).unwrap_or_default(),
            hosts: listener
                .imports()
                .iter()
                .flat_map(|(ns, hosts)| hosts.iter().map(move |h| format!("{ns}/{h}")))
                .collect(),
            services: listener
                .services()
                .iter()
                .map(|s| s.hostname.to_string())
                .collect(),
            routing_rules: listener
                .routing_rules()
                .iter()
                .map(|r| format!("{}/{}", r.namespace, r.name))
                .collect(),
        }
    }
}

// === impl ServiceReport ===

impl ServiceReport {
    fn new(svc: &Service) -> Self {
        Self {
            hostname: svc.hostname.to_string(),
            namespace: svc.namespace().to_string(),
            ports: svc
                .ports
                .iter()
                .map(|p| PortReport {
                    name: p.name.clone(),
                    port: p.port,
                    protocol: p.protocol.to_string(),
                })
                .collect(),
        }
    }
}
