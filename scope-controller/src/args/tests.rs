use super::*;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

const SERVICES: &str = r#"
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
apiVersion: v1
kind: Service
metadata:
  name: ratings
  namespace: bookinfo
spec:
  ports:
  - name: http
    port: 9080
  - name: grpc-admin
    port: 9090
---
apiVersion: v1
kind: Service
metadata:
  name: details
  namespace: other
  annotations:
    networking.istio.io/exportTo: "."
spec:
  ports:
  - name: http
    port: 9080
"#;

const CONFIG: &str = r#"
apiVersion: networking.istio.io/v1alpha3
kind: Sidecar
metadata:
  name: reviews
  namespace: bookinfo
spec:
  workloadSelector:
    labels:
      app: reviews
  egress:
  - port:
      number: 9080
      protocol: HTTP
      name: http
    hosts:
    - "./ratings.bookinfo.svc.cluster.local"
  - hosts:
    - "istio-system/*"
---
apiVersion: networking.istio.io/v1alpha3
kind: VirtualService
metadata:
  name: ratings
  namespace: bookinfo
spec:
  hosts:
  - ratings
  http:
  - route:
    - destination:
        host: ratings
---
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: ratings
  namespace: bookinfo
spec:
  host: ratings
  subsets:
  - name: v1
    labels:
      version: v1
"#;

fn mk_manifest(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file must be created");
    file.write_all(contents.as_bytes())
        .expect("manifest must be written");
    file
}

fn run(manifests: &[&NamedTempFile], flags: &[&str]) -> Value {
    let mut argv = vec!["mesh-scope".to_string(), "--manifests".to_string()];
    argv.extend(
        manifests
            .iter()
            .map(|f| f.path().to_string_lossy().into_owned()),
    );
    argv.extend(flags.iter().map(|f| f.to_string()));
    let args = Args::try_parse_from(argv).expect("arguments must parse");

    let mut out = Vec::<u8>::new();
    args.run(&mut out).expect("scope must be reported");
    serde_json::from_slice(&out).expect("report must be JSON")
}

#[test]
fn reports_sidecar_scope() {
    let services = mk_manifest(SERVICES);
    let config = mk_manifest(CONFIG);
    let report = run(
        &[&services, &config],
        &[
            "--namespace",
            "bookinfo",
            "--workload-labels",
            "app=reviews,version=v2",
            "--port",
            "9080",
        ],
    );

    let ratings = "ratings.bookinfo.svc.cluster.local";
    assert_eq!(report["namespace"], "bookinfo");
    assert_eq!(report["sidecar"], "reviews");
    assert_eq!(report["selectedListener"], 0);
    assert_eq!(report["namespaceDependencies"], json!(["bookinfo"]));
    assert_eq!(
        report["egressListeners"],
        json!([
            {
                "port": 9080,
                "hosts": [format!("bookinfo/{ratings}")],
                "services": [ratings],
                "routingRules": ["bookinfo/ratings"],
            },
            {
                "hosts": ["istio-system/*"],
                "services": [],
                "routingRules": [],
            },
        ])
    );
    assert_eq!(
        report["services"],
        json!([{
            "hostname": ratings,
            "namespace": "bookinfo",
            // Inferring the service from the routing rule merges its other ports.
            "ports": [
                {"name": "http", "port": 9080, "protocol": "HTTP"},
                {"name": "grpc-admin", "port": 9090, "protocol": "GRPC"},
            ],
        }])
    );
    assert_eq!(
        report["policies"],
        json!([{"hostname": ratings, "policy": "bookinfo/ratings"}])
    );
    assert!(report.get("outboundTrafficPolicy").is_none());
}

#[test]
fn reports_default_scope() {
    let services = mk_manifest(SERVICES);
    let config = mk_manifest(CONFIG);
    let report = run(
        &[&services, &config],
        &[
            "--namespace",
            "bookinfo",
            "--workload-labels",
            "app=ratings",
            "--outbound-traffic-policy",
            "ALLOW_ANY",
            "--port",
            "8080",
        ],
    );

    assert!(report.get("sidecar").is_none());
    assert_eq!(report["outboundTrafficPolicy"], "ALLOW_ANY");
    assert_eq!(report["selectedListener"], 0);
    let hostnames = report["services"]
        .as_array()
        .expect("services must be a list")
        .iter()
        .map(|svc| svc["hostname"].as_str().expect("hostname must be set"))
        .collect::<Vec<_>>();
    // The service in `other` is not exported to `bookinfo`.
    assert_eq!(
        hostnames,
        vec![
            "ratings.bookinfo.svc.cluster.local",
            "reviews.bookinfo.svc.cluster.local",
        ]
    );
    assert_eq!(report["egressListeners"][0]["hosts"], json!(["*/*"]));
    assert_eq!(
        report["egressListeners"][0]["routingRules"],
        json!(["bookinfo/ratings"])
    );
}

#[test]
fn selects_catch_all_listener_for_unknown_ports() {
    let services = mk_manifest(SERVICES);
    let config = mk_manifest(CONFIG);
    let report = run(
        &[&services, &config],
        &[
            "--namespace",
            "bookinfo",
            "--workload-labels",
            "app=reviews",
            "--port",
            "8080",
        ],
    );
    assert_eq!(report["selectedListener"], 1);
}

#[test]
fn rejects_invalid_arguments() {
    assert!(Args::try_parse_from(["mesh-scope", "--namespace", "ns"]).is_err());
    assert!(Args::try_parse_from([
        "mesh-scope",
        "--manifests",
        "a.yaml",
        "--namespace",
        "ns",
        "--workload-labels",
        "app",
    ])
    .is_err());
    assert!(Args::try_parse_from([
        "mesh-scope",
        "--manifests",
        "a.yaml",
        "--namespace",
        "ns",
        "--log-format",
        "xml",
    ])
    .is_err());
}

#[test]
fn reports_missing_manifests() {
    let args = Args::try_parse_from([
        "mesh-scope",
        "--manifests",
        "/nonexistent/manifests.yaml",
        "--namespace",
        "ns",
    ])
    .expect("arguments must parse");
    let error = args.run(&mut Vec::<u8>::new()).unwrap_err();
    assert!(
        format!("{error:#}").contains("failed to read /nonexistent/manifests.yaml"),
        "{error:#}"
    );
}
