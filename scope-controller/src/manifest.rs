use crate::k8s::{
    self,
    networking::{self, DestinationRule, Sidecar, VirtualService},
};
use anyhow::{Context, Result};
use kubert::index::IndexNamespacedResource;
use mesh_scope_k8s_index::ScopeIndex;
use serde::Deserialize;
use std::path::Path;

/// A resource that contributes to sidecar scopes.
#[derive(Clone, Debug)]
pub enum Resource {
    Service(k8s::Service),
    Sidecar(Sidecar),
    VirtualService(VirtualService),
    DestinationRule(DestinationRule),
}

/// Reads every supported resource from a YAML file, which may hold several documents.
pub fn load(path: &Path) -> Result<Vec<Resource>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parses a multi-document YAML stream. Documents of other kinds are skipped.
pub fn parse(text: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default()
            .to_string();
        let api_version = value
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let group = api_version
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or_default();

        let resource = match (group, kind.as_str()) {
            ("", "Service") => Resource::Service(decode(value, &kind)?),
            (networking::GROUP, "Sidecar") => Resource::Sidecar(decode(value, &kind)?),
            (networking::GROUP, "VirtualService") => {
                Resource::VirtualService(decode(value, &kind)?)
            }
            (networking::GROUP, "DestinationRule") => {
                Resource::DestinationRule(decode(value, &kind)?)
            }
            _ => {
                tracing::debug!(%api_version, %kind, "skipping unsupported resource");
                continue;
            }
        };
        resources.push(resource);
    }
    Ok(resources)
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_yaml::Value, kind: &str) -> Result<T> {
    let name = value
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|n| n.as_str())
        .unwrap_or_default()
        .to_string();
    serde_yaml::from_value(value).with_context(|| format!("invalid {kind} {name:?}"))
}

// === impl Resource ===

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(_) => "Service",
            Self::Sidecar(_) => "Sidecar",
            Self::VirtualService(_) => "VirtualService",
            Self::DestinationRule(_) => "DestinationRule",
        }
    }

    pub fn apply_to(self, index: &mut ScopeIndex) {
        match self {
            Self::Service(svc) => index.apply(svc),
            Self::Sidecar(sidecar) => index.apply(sidecar),
            Self::VirtualService(vs) => index.apply(vs),
            Self::DestinationRule(dr) => index.apply(dr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_documents() {
        let resources = parse(
            r#"
apiVersion: v1
kind: Service
metadata:
  name: reviews
  namespace: bookinfo
spec:
  ports:
  - name: http
    port: 9080
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: reviews
  namespace: bookinfo
---
apiVersion: networking.istio.io/v1alpha3
kind: Sidecar
metadata:
  name: default
  namespace: bookinfo
spec:
  egress:
  - hosts:
    - "./*"
---
apiVersion: networking.istio.io/v1alpha3
kind: VirtualService
metadata:
  name: reviews
  namespace: bookinfo
spec:
  hosts:
  - reviews
---
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: reviews
  namespace: bookinfo
spec:
  host: reviews
---
"#,
        )
        .expect("manifests must parse");

        let kinds = resources.iter().map(Resource::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec!["Service", "Sidecar", "VirtualService", "DestinationRule"]
        );
    }

    #[test]
    fn rejects_malformed_resources() {
        let error = parse(
            r#"
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: broken
  namespace: bookinfo
spec:
  subsets: []
"#,
        )
        .unwrap_err();
        assert!(
            format!("{error:#}").contains("invalid DestinationRule \"broken\""),
            "{error:#}"
        );
    }
}
