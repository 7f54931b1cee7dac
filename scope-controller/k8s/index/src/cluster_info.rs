use mesh_scope_core::{host::Name, OutboundTrafficPolicy};

/// Holds cluster metadata.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// E.g. "cluster.local"
    pub dns_domain: String,

    /// The mesh-wide outbound traffic policy, used by scopes whose sidecar does not set one.
    pub outbound_traffic_policy: Option<OutboundTrafficPolicy>,
}

impl ClusterInfo {
    pub(crate) fn service_hostname(&self, ns: &str, svc: &str) -> Name {
        format!("{}.{}.svc.{}", svc, ns, self.dns_domain).into()
    }

    /// Expands a short host name, as may be used in routing rules and policies, to a fully
    /// qualified service hostname in `ns`. Qualified names and wildcards are returned as-is.
    pub(crate) fn resolve_host(&self, ns: &str, host: &str) -> Name {
        if host == Name::WILDCARD || host.contains('.') {
            return host.into();
        }
        self.service_hostname(ns, host)
    }
}
