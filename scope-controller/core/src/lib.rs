//! Sidecar scoping.
//!
//! A [`SidecarScope`] is the set of services, routing rules, and policies that a proxy's outbound
//! configuration may reference. Scopes are computed once per configuration namespace (and per
//! `Sidecar` resource, when one applies) from a [`MeshContext`], and are then shared read-only by
//! every proxy that maps to them.
//!
//! ```text
//! [ Sidecar ] -> [ EgressListenerScope ]* -> [ SidecarScope ] <- [ MeshContext ]
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod host;
mod mesh;
pub mod policy;
pub mod routing;
pub mod scope;
pub mod service;
pub mod sidecar;
mod traffic;

pub use self::{
    mesh::{MeshContext, ServicesByNamespace, MESH_GATEWAY},
    policy::Policy,
    routing::RoutingRule,
    scope::{EgressListenerScope, ScopeLookup, SidecarScope},
    service::{Port, Protocol, Service},
    sidecar::Sidecar,
    traffic::OutboundTrafficPolicy,
};
