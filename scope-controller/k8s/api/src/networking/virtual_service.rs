use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Routing rules for traffic addressed to a set of hosts.
///
/// Only the fields that determine which hosts a rule applies to and where it sends traffic are
/// modeled; match conditions and rewrites are left to the proxy configuration.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "VirtualService",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    /// Destination hosts that the rules apply to. Short names are resolved relative to the
    /// rule's namespace.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Gateways the rules bind to. The reserved `mesh` gateway denotes all sidecars; when empty,
    /// the rules bind to `mesh` only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    /// Namespaces that the rules are visible to. When empty, the rules are visible everywhere.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_to: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpRoute>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp: Vec<TcpRoute>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<TlsRoute>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<RouteDestination>,

    /// Traffic is additionally mirrored to this destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<Destination>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TcpRoute {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<RouteDestination>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TlsRoute {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<RouteDestination>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RouteDestination {
    pub destination: Destination,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Destination {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PortSelector {
    pub number: u32,
}

// === impl VirtualServiceSpec ===

impl VirtualServiceSpec {
    /// Iterates over every destination referenced by the rules, including mirrors, in
    /// declaration order.
    pub fn destinations(&self) -> impl Iterator<Item = &Destination> {
        let http = self.http.iter().flat_map(|route| {
            route
                .route
                .iter()
                .map(|rd| &rd.destination)
                .chain(route.mirror.as_ref())
        });
        let tcp = self
            .tcp
            .iter()
            .flat_map(|route| route.route.iter().map(|rd| &rd.destination));
        let tls = self
            .tls
            .iter()
            .flat_map(|route| route.route.iter().map(|rd| &rd.destination));
        http.chain(tcp).chain(tls)
    }
}
