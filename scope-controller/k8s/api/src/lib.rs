#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod networking;

pub use self::labels::Labels;
pub use k8s_openapi::api::{
    self,
    core::v1::{Service, ServicePort, ServiceSpec},
};
pub use kube::api::{ObjectMeta, ResourceExt};

/// Annotation that restricts the namespaces a `Service` is visible to.
pub const EXPORT_TO_ANNOTATION: &str = "networking.istio.io/exportTo";
