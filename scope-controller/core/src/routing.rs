use crate::{host::Name, mesh::MESH_GATEWAY};

/// A routing resource (virtual service) for one or more hostnames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRule {
    pub name: String,
    pub namespace: String,

    /// The host patterns that this rule routes for.
    pub hosts: Vec<Name>,

    /// Gateways that this rule is bound to. An empty list binds the rule to the mesh gateway.
    pub gateways: Vec<String>,

    /// The destinations that this rule routes to, in declaration order.
    pub destinations: Vec<Destination>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub host: Name,
    pub subset: Option<String>,
    pub port: Option<u16>,
}

// === impl RoutingRule ===

impl RoutingRule {
    pub fn destination_hosts(&self) -> impl Iterator<Item = &Name> + '_ {
        self.destinations.iter().map(|d| &d.host)
    }

    /// Indicates whether the rule is bound to any of the given gateways.
    pub fn binds_to(&self, gateways: &[&str]) -> bool {
        if self.gateways.is_empty() {
            return gateways.contains(&MESH_GATEWAY);
        }
        self.gateways
            .iter()
            .any(|gw| gateways.contains(&gw.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_rule(gateways: &[&str]) -> RoutingRule {
        RoutingRule {
            name: "rule".to_string(),
            namespace: "ns".to_string(),
            hosts: vec!["a.com".into()],
            gateways: gateways.iter().map(|gw| gw.to_string()).collect(),
            destinations: vec![],
        }
    }

    #[test]
    fn binds_to_mesh_by_default() {
        assert!(mk_rule(&[]).binds_to(&[MESH_GATEWAY]));
        assert!(!mk_rule(&[]).binds_to(&["ns/ingress"]));
        assert!(mk_rule(&["ns/ingress", MESH_GATEWAY]).binds_to(&[MESH_GATEWAY]));
        assert!(!mk_rule(&["ns/ingress"]).binds_to(&[MESH_GATEWAY]));
    }
}
