use crate::{destination_rule, service, virtual_service, ClusterInfo, ExportTo};
use ahash::AHashMap as HashMap;
use mesh_scope_core::{
    host::Name, MeshContext, OutboundTrafficPolicy, Policy, RoutingRule, Service,
    ServicesByNamespace,
};
use mesh_scope_k8s_api::{
    networking::{DestinationRule, VirtualService},
    ResourceExt, Service as KubeService,
};
use std::{collections::BTreeMap, sync::Arc};

/// Indexes the services, routing rules, and policies of a cluster.
///
/// All resources are held in a deterministic order so that the scopes built from the index do not
/// depend on the order in which resources were observed.
#[derive(Debug)]
pub struct MeshIndex {
    cluster_info: Arc<ClusterInfo>,

    /// Ordered by hostname, then namespace.
    services: BTreeMap<ServiceKey, Exported<Service>>,
    by_hostname: HashMap<Name, ServicesByNamespace>,

    /// Ordered by namespace, then name.
    routing_rules: BTreeMap<ResourceKey, Exported<RoutingRule>>,

    /// Ordered by namespace, then name.
    policies: BTreeMap<ResourceKey, Exported<Policy>>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ServiceKey {
    hostname: Name,
    namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ResourceKey {
    namespace: String,
    name: String,
}

#[derive(Debug)]
struct Exported<T> {
    resource: Arc<T>,
    export: ExportTo,
}

// === impl MeshIndex ===

impl MeshIndex {
    pub fn new(cluster_info: Arc<ClusterInfo>) -> Self {
        Self {
            cluster_info,
            services: BTreeMap::new(),
            by_hostname: HashMap::default(),
            routing_rules: BTreeMap::new(),
            policies: BTreeMap::new(),
        }
    }

    pub fn cluster_info(&self) -> &ClusterInfo {
        &self.cluster_info
    }

    pub(crate) fn services_len(&self) -> usize {
        self.services.len()
    }

    pub(crate) fn routing_rules_len(&self) -> usize {
        self.routing_rules.len()
    }

    pub(crate) fn policies_len(&self) -> usize {
        self.policies.len()
    }

    fn visible<'a, T: 'a>(
        resources: impl Iterator<Item = &'a Exported<T>>,
        namespace: &'a str,
    ) -> impl Iterator<Item = &'a Arc<T>> {
        resources
            .filter(move |r| r.export.is_visible_to(namespace))
            .map(|r| &r.resource)
    }
}

impl MeshContext for MeshIndex {
    fn services(&self, namespace: &str) -> Vec<Arc<Service>> {
        Self::visible(self.services.values(), namespace)
            .cloned()
            .collect()
    }

    fn routing_rules(&self, namespace: &str, gateways: &[&str]) -> Vec<Arc<RoutingRule>> {
        Self::visible(self.routing_rules.values(), namespace)
            .filter(|rule| rule.binds_to(gateways))
            .cloned()
            .collect()
    }

    /// Policies in the proxy's namespace take precedence over those in the service's namespace,
    /// which take precedence over those in any other namespace. Only policies exported to the
    /// proxy's namespace are considered.
    fn resolve_policy(&self, namespace: &str, service: &Service) -> Option<Arc<Policy>> {
        let tiers = [Some(namespace), Some(service.namespace()), None];
        tiers.into_iter().find_map(|tier| {
            let candidates = Self::visible(self.policies.values(), namespace).filter(|p| {
                match tier {
                    Some(ns) => p.namespace == ns,
                    None => p.namespace != namespace && p.namespace != service.namespace(),
                }
            });
            destination_rule::most_specific(&service.hostname, candidates).cloned()
        })
    }

    fn services_by_hostname(&self, hostname: &Name) -> Option<&ServicesByNamespace> {
        self.by_hostname.get(hostname)
    }

    fn outbound_traffic_policy(&self) -> Option<OutboundTrafficPolicy> {
        self.cluster_info.outbound_traffic_policy
    }
}

impl kubert::index::IndexNamespacedResource<KubeService> for MeshIndex {
    fn apply(&mut self, svc: KubeService) {
        let (svc, export) = match service::convert(&self.cluster_info, &svc) {
            Ok(svc) => svc,
            Err(error) => {
                tracing::error!(
                    %error,
                    ns = %svc.namespace().unwrap_or_default(),
                    name = %svc.name_unchecked(),
                    "ignoring invalid Service",
                );
                return;
            }
        };
        tracing::debug!(hostname = %svc.hostname, ns = svc.namespace(), "indexing service");

        let svc = Arc::new(svc);
        self.by_hostname
            .entry(svc.hostname.clone())
            .or_default()
            .insert(svc.namespace().to_string(), svc.clone());
        let key = ServiceKey {
            hostname: svc.hostname.clone(),
            namespace: svc.namespace().to_string(),
        };
        self.services.insert(
            key,
            Exported {
                resource: svc,
                export,
            },
        );
    }

    fn delete(&mut self, namespace: String, name: String) {
        let hostname = self.cluster_info.service_hostname(&namespace, &name);
        if let Some(by_ns) = self.by_hostname.get_mut(&hostname) {
            by_ns.remove(&namespace);
            if by_ns.is_empty() {
                self.by_hostname.remove(&hostname);
            }
        }
        self.services.remove(&ServiceKey {
            hostname,
            namespace,
        });
    }
}

impl kubert::index::IndexNamespacedResource<VirtualService> for MeshIndex {
    fn apply(&mut self, vs: VirtualService) {
        let (rule, export) = match virtual_service::convert(&self.cluster_info, &vs) {
            Ok(rule) => rule,
            Err(error) => {
                tracing::error!(
                    %error,
                    ns = %vs.namespace().unwrap_or_default(),
                    name = %vs.name_unchecked(),
                    "ignoring invalid VirtualService",
                );
                return;
            }
        };
        tracing::debug!(ns = %rule.namespace, name = %rule.name, "indexing routing rule");

        let key = ResourceKey {
            namespace: rule.namespace.clone(),
            name: rule.name.clone(),
        };
        self.routing_rules.insert(
            key,
            Exported {
                resource: Arc::new(rule),
                export,
            },
        );
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.routing_rules.remove(&ResourceKey { namespace, name });
    }
}

impl kubert::index::IndexNamespacedResource<DestinationRule> for MeshIndex {
    fn apply(&mut self, dr: DestinationRule) {
        let (policy, export) = match destination_rule::convert(&self.cluster_info, &dr) {
            Ok(policy) => policy,
            Err(error) => {
                tracing::error!(
                    %error,
                    ns = %dr.namespace().unwrap_or_default(),
                    name = %dr.name_unchecked(),
                    "ignoring invalid DestinationRule",
                );
                return;
            }
        };
        tracing::debug!(ns = %policy.namespace, name = %policy.name, "indexing policy");

        let key = ResourceKey {
            namespace: policy.namespace.clone(),
            name: policy.name.clone(),
        };
        self.policies.insert(
            key,
            Exported {
                resource: Arc::new(policy),
                export,
            },
        );
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.policies.remove(&ResourceKey { namespace, name });
    }
}
