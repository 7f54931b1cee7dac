//! Mesh scope index
//!
//! Maintains the mesh configuration that sidecar scopes are computed from, and memoizes the
//! scopes themselves. It indexes the following cluster resources:
//!
//! - Each `Service` is exposed to the mesh under `<name>.<namespace>.svc.<cluster-domain>`. Its
//!   visibility may be restricted with the `networking.istio.io/exportTo` annotation.
//! - Each `VirtualService` is a routing rule for one or more hosts; its destinations determine
//!   which services a sidecar implicitly depends on.
//! - Each `DestinationRule` is a policy for the services matching its host.
//! - Each `Sidecar` restricts the configuration visible to the workloads it selects.
//!
//! ```text
//! [ Service ] [ VirtualService ] [ DestinationRule ] -> [ MeshIndex ]
//!                                                            |
//!                                       [ Sidecar ] -> [ ScopeIndex ] -> [ SidecarScope ]
//! ```
//!
//! Scopes are built lazily, on lookup, and cached until a change to the mesh or to the
//! namespace's sidecars invalidates them.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cluster_info;
mod destination_rule;
mod export;
mod mesh;
pub mod metrics;
mod service;
mod sidecar;
mod virtual_service;

#[cfg(test)]
mod tests;

pub use self::{
    cluster_info::ClusterInfo,
    export::ExportTo,
    mesh::MeshIndex,
    metrics::ScopeMetrics,
    sidecar::{ScopeIndex, SharedIndex},
};

/// Describes why a resource could not be indexed.
///
/// Invalid resources are logged and ignored; they never prevent scopes from being built.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("resource must have a namespace")]
    MissingNamespace,

    #[error("invalid port number: {0}")]
    InvalidPort(i64),

    #[error("destination rule must specify a host")]
    MissingHost,

    #[error("egress host must be of the form namespace/host: {0:?}")]
    InvalidEgressHost(String),

    #[error("sidecar must have at least one egress listener")]
    EmptyEgress,

    #[error("egress listener without a port must be the last listener")]
    CatchAllNotLast,
}
