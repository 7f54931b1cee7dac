use crate::{ClusterInfo, Error, ExportTo};
use mesh_scope_core::{
    service::{Attributes, Port, Protocol},
    Service,
};
use mesh_scope_k8s_api::{ResourceExt, Service as KubeService, ServicePort, EXPORT_TO_ANNOTATION};

/// Converts a Kubernetes `Service` into a mesh service and its visibility.
pub(crate) fn convert(
    cluster: &ClusterInfo,
    svc: &KubeService,
) -> Result<(Service, ExportTo), Error> {
    let namespace = svc.namespace().ok_or(Error::MissingNamespace)?;
    let name = svc.name_unchecked();

    let ports = svc
        .spec
        .iter()
        .flat_map(|spec| spec.ports.iter().flatten())
        .map(convert_port)
        .collect::<Result<Vec<_>, _>>()?;

    let export = ExportTo::from_annotation(
        &namespace,
        svc.annotations().get(EXPORT_TO_ANNOTATION).map(String::as_str),
    );

    let svc = Service {
        hostname: cluster.service_hostname(&namespace, &name),
        ports,
        attributes: Attributes { name, namespace },
    };
    Ok((svc, export))
}

fn convert_port(port: &ServicePort) -> Result<Port, Error> {
    let number = u16::try_from(port.port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(Error::InvalidPort(port.port.into()))?;
    let name = port.name.clone().unwrap_or_default();
    Ok(Port {
        protocol: port_protocol(port, &name),
        name,
        port: number,
    })
}

/// Determines a port's application protocol from its `appProtocol`, else from the prefix of its
/// name (e.g. `http-web`). Ports that declare neither are treated as opaque TCP.
fn port_protocol(port: &ServicePort, name: &str) -> Protocol {
    if port.protocol.as_deref() == Some("UDP") {
        return Protocol::Udp;
    }
    if let Some(app) = port.app_protocol.as_deref() {
        return Protocol::parse(app);
    }
    let prefix = name.split('-').next().unwrap_or_default();
    match Protocol::parse(prefix) {
        Protocol::Unsupported => Protocol::Tcp,
        protocol => protocol,
    }
}
