use crate::{ClusterInfo, Error, ExportTo};
use mesh_scope_core::{
    host::Name,
    policy::{Policy, Subset},
};
use mesh_scope_k8s_api::{networking::DestinationRule, ResourceExt};
use std::{cmp::Reverse, sync::Arc};

/// Converts a `DestinationRule` into a policy and its visibility.
pub(crate) fn convert(
    cluster: &ClusterInfo,
    dr: &DestinationRule,
) -> Result<(Policy, ExportTo), Error> {
    let namespace = dr.namespace().ok_or(Error::MissingNamespace)?;
    if dr.spec.host.is_empty() {
        return Err(Error::MissingHost);
    }

    let subsets = dr
        .spec
        .subsets
        .iter()
        .map(|s| Subset {
            name: s.name.clone(),
            labels: s.labels.clone(),
        })
        .collect();

    let export = ExportTo::from_list(&namespace, dr.spec.export_to.iter().map(String::as_str));

    let policy = Policy {
        name: dr.name_unchecked(),
        host: cluster.resolve_host(&namespace, &dr.spec.host),
        namespace,
        subsets,
    };
    Ok((policy, export))
}

/// Picks the policy whose host most specifically matches `hostname`: an exact host before any
/// wildcard, and longer wildcards before shorter ones. The first of equally specific candidates
/// wins.
pub(crate) fn most_specific<'p>(
    hostname: &Name,
    candidates: impl IntoIterator<Item = &'p Arc<Policy>>,
) -> Option<&'p Arc<Policy>> {
    candidates
        .into_iter()
        .filter(|p| p.host.matches(hostname))
        .min_by_key(|p| Reverse((!p.host.is_wildcard(), p.host.as_str().len())))
}
