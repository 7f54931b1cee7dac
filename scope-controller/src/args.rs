use crate::{manifest, report::ScopeReport};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use mesh_scope_core::OutboundTrafficPolicy;
use mesh_scope_k8s_api::Labels;
use mesh_scope_k8s_index::{metrics, ClusterInfo, ScopeIndex, ScopeMetrics};
use prometheus_client::registry::Registry;
use std::{io::Write, path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(name = "mesh-scope", about = "Computes the sidecar scope of a workload")]
pub struct Args {
    #[clap(long, default_value = "mesh_scope=info,warn", env = "MESH_SCOPE_LOG")]
    log_level: String,

    #[clap(long, default_value = "plain")]
    log_format: LogFormat,

    /// YAML files holding Services, Sidecars, VirtualServices, and DestinationRules.
    #[clap(long, required = true, num_args = 1..)]
    manifests: Vec<PathBuf>,

    /// The workload's namespace.
    #[clap(long)]
    namespace: String,

    /// The workload's labels, as `key=value` pairs separated by commas.
    #[clap(long, default_value = "", value_parser = parse_labels)]
    workload_labels: Labels,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    /// The mesh-wide outbound traffic policy: REGISTRY_ONLY or ALLOW_ANY.
    #[clap(long)]
    outbound_traffic_policy: Option<OutboundTrafficPolicy>,

    /// Reports the egress listener that serves this port.
    #[clap(long)]
    port: Option<u16>,

    /// The bind address to match when `--port` is 0.
    #[clap(long, default_value = "")]
    bind: String,

    /// Writes the index's metrics to stderr.
    #[clap(long)]
    metrics: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

// === impl Args ===

impl Args {
    pub fn parse_and_run() -> Result<()> {
        let args = Self::parse();
        args.log_format.try_init(&args.log_level)?;
        let stdout = std::io::stdout();
        args.run(&mut stdout.lock())
    }

    /// Indexes the manifests and writes the workload's scope, as JSON, to `out`.
    pub fn run(self, out: &mut impl Write) -> Result<()> {
        let cluster_info = Arc::new(ClusterInfo {
            dns_domain: self.cluster_domain.clone(),
            outbound_traffic_policy: self.outbound_traffic_policy,
        });

        let mut prom = Registry::default();
        let index = ScopeIndex::shared(cluster_info, ScopeMetrics::register(&mut prom));
        metrics::register(&mut prom, index.clone());

        for path in &self.manifests {
            let resources = manifest::load(path)?;
            tracing::info!(path = %path.display(), resources = resources.len(), "loaded manifests");
            let mut index = index.write();
            for resource in resources {
                resource.apply_to(&mut index);
            }
        }

        let scope = ScopeIndex::lookup(&index, &self.namespace, &self.workload_labels);
        tracing::debug!(
            ns = %self.namespace,
            sidecar = ?scope.sidecar().map(|s| &s.name),
            services = scope.services().len(),
            "resolved scope",
        );
        let port = self.port.map(|port| (port, self.bind.as_str()));
        let report = ScopeReport::new(&scope, port);

        serde_json::to_writer_pretty(&mut *out, &report).context("failed to write report")?;
        writeln!(out)?;

        if self.metrics {
            let mut text = String::new();
            prometheus_client::encoding::text::encode(&mut text, &prom)
                .context("failed to encode metrics")?;
            eprint!("{text}");
        }

        Ok(())
    }
}

fn parse_labels(s: &str) -> Result<Labels> {
    Labels::parse(s).ok_or_else(|| anyhow!("invalid workload labels: {:?}", s))
}

// === impl LogFormat ===

impl LogFormat {
    /// Installs a global subscriber that writes to stderr, leaving stdout to the report.
    pub fn try_init(self, filter: &str) -> Result<()> {
        let filter = EnvFilter::try_new(filter).context("invalid log filter")?;
        let fmt = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        let init = match self {
            Self::Plain => fmt.try_init(),
            Self::Json => fmt.json().try_init(),
        };
        init.map_err(anyhow::Error::msg)
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            s => bail!("invalid log format: {:?}", s),
        }
    }
}

#[cfg(test)]
mod tests;
