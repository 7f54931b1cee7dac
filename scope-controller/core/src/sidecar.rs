use crate::{service::Protocol, traffic::OutboundTrafficPolicy};

/// A validated `Sidecar` resource, as consumed by scope construction.
///
/// Workload selection is resolved before a scope is built, so it is not modeled here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sidecar {
    pub name: String,
    pub namespace: String,
    pub ingress: Vec<IngressListener>,

    /// Must not be empty. A listener without a port may only appear last.
    pub egress: Vec<EgressListener>,

    pub outbound_traffic_policy: Option<OutboundTrafficPolicy>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EgressListener {
    /// When unset, the listener catches all traffic not matched by a preceding listener.
    pub port: Option<ListenerPort>,

    /// The bind address, or the path of a unix domain socket when the port is 0.
    pub bind: String,

    pub capture_mode: CaptureMode,

    /// Imports of the form `namespace/host`.
    pub hosts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressListener {
    pub port: ListenerPort,
    pub bind: String,
    pub capture_mode: CaptureMode,
    pub default_endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerPort {
    pub number: u16,
    pub protocol: Protocol,
    pub name: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    #[default]
    Default,
    Iptables,
    None,
}

// === impl Sidecar ===

impl Sidecar {
    pub fn has_ingress(&self) -> bool {
        !self.ingress.is_empty()
    }
}
