use crate::{ClusterInfo, Error, ExportTo};
use mesh_scope_core::{routing::Destination, RoutingRule};
use mesh_scope_k8s_api::{networking::VirtualService, ResourceExt};

/// Converts a `VirtualService` into a routing rule and its visibility.
///
/// Short host names, in both the rule's hosts and its destinations, are qualified relative to the
/// rule's namespace.
pub(crate) fn convert(
    cluster: &ClusterInfo,
    vs: &VirtualService,
) -> Result<(RoutingRule, ExportTo), Error> {
    let namespace = vs.namespace().ok_or(Error::MissingNamespace)?;

    let hosts = vs
        .spec
        .hosts
        .iter()
        .map(|h| cluster.resolve_host(&namespace, h))
        .collect();

    let destinations = vs
        .spec
        .destinations()
        .map(|dst| -> Result<_, Error> {
            let port = match dst.port {
                Some(p) => {
                    let number =
                        u16::try_from(p.number).map_err(|_| Error::InvalidPort(p.number.into()))?;
                    Some(number)
                }
                None => None,
            };
            Ok(Destination {
                host: cluster.resolve_host(&namespace, &dst.host),
                subset: dst.subset.clone(),
                port,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let export = ExportTo::from_list(&namespace, vs.spec.export_to.iter().map(String::as_str));

    let rule = RoutingRule {
        name: vs.name_unchecked(),
        namespace,
        hosts,
        gateways: vs.spec.gateways.clone(),
        destinations,
    };
    Ok((rule, export))
}
