use anyhow::{anyhow, Error, Result};

/// Controls whether a proxy forwards traffic to destinations that are not in its scope.
///
/// When no policy is configured, unknown destinations are denied.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutboundTrafficPolicy {
    /// Only destinations in the proxy's scope are reachable.
    RegistryOnly,

    /// Traffic to unknown destinations is passed through.
    AllowAny,
}

// === impl OutboundTrafficPolicy ===

impl std::str::FromStr for OutboundTrafficPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "REGISTRY_ONLY" | "registry-only" => Ok(Self::RegistryOnly),
            "ALLOW_ANY" | "allow-any" => Ok(Self::AllowAny),
            s => Err(anyhow!("invalid outbound traffic policy: {:?}", s)),
        }
    }
}

impl std::fmt::Display for OutboundTrafficPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegistryOnly => "REGISTRY_ONLY".fmt(f),
            Self::AllowAny => "ALLOW_ANY".fmt(f),
        }
    }
}
