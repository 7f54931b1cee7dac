use crate::{
    host::Name, policy::Policy, routing::RoutingRule, service::Service,
    traffic::OutboundTrafficPolicy,
};
use std::{collections::BTreeMap, sync::Arc};

/// The name of the built-in gateway that every sidecar proxy belongs to.
pub const MESH_GATEWAY: &str = "mesh";

/// Services that share a hostname, keyed by namespace.
///
/// Ordered so that callers may deterministically pick the alphabetically-first namespace.
pub type ServicesByNamespace = BTreeMap<String, Arc<Service>>;

/// Models the mesh-wide configuration that scopes are computed from.
///
/// Implementations own ingestion and invalidation of mesh state. Scopes only ever read from a
/// context; a scope is valid for the snapshot of the context that it was built from.
pub trait MeshContext {
    /// All services visible from the given configuration namespace.
    fn services(&self, namespace: &str) -> Vec<Arc<Service>>;

    /// All routing rules visible from the given configuration namespace that bind to any of the
    /// given gateways.
    fn routing_rules(&self, namespace: &str, gateways: &[&str]) -> Vec<Arc<RoutingRule>>;

    /// Resolves the policy that applies to `service` for proxies in `namespace`.
    fn resolve_policy(&self, namespace: &str, service: &Service) -> Option<Arc<Policy>>;

    /// All services exposing `hostname`, regardless of visibility.
    fn services_by_hostname(&self, hostname: &Name) -> Option<&ServicesByNamespace>;

    /// The mesh-wide outbound traffic policy, if one is configured.
    fn outbound_traffic_policy(&self) -> Option<OutboundTrafficPolicy>;
}
