use crate::host::Name;
use std::collections::BTreeMap;

/// A destination rule: traffic policy for the services selected by `host`.
///
/// Scopes treat policies as opaque; they are resolved per service by the [`MeshContext`] and
/// stored by hostname.
///
/// [`MeshContext`]: crate::MeshContext
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub namespace: String,
    pub host: Name,
    pub subsets: Vec<Subset>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subset {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}
