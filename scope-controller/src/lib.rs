//! Computes sidecar scopes from Kubernetes manifests.
//!
//! The `mesh-scope` tool indexes the `Service`, `VirtualService`, `DestinationRule`, and
//! `Sidecar` resources found in a set of manifests, resolves the scope of a workload, and reports
//! it as JSON.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;
pub mod manifest;
pub mod report;

pub use self::args::{Args, LogFormat};
pub use mesh_scope_k8s_api as k8s;
pub use mesh_scope_k8s_index as index;
