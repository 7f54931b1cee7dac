pub mod destination_rule;
pub mod sidecar;
pub mod virtual_service;

pub use self::{
    destination_rule::{DestinationRule, DestinationRuleSpec},
    sidecar::{Sidecar, SidecarSpec},
    virtual_service::{VirtualService, VirtualServiceSpec},
};

/// The API group of all resources in this module.
pub const GROUP: &str = "networking.istio.io";
