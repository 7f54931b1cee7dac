use crate::host::Name;
use std::{convert::Infallible, fmt, str::FromStr};

/// A mesh-visible destination.
///
/// A service is identified by its hostname and namespace; the same hostname may be exported by
/// several namespaces at once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Service {
    pub hostname: Name,
    pub ports: Vec<Port>,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
}

/// Application protocols that a service port or listener may declare.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Grpc,
    GrpcWeb,
    Http,
    /// The listener acts as a generic HTTP egress proxy.
    HttpProxy,
    Http2,
    Https,
    Tcp,
    Tls,
    Udp,
    Mongo,
    Redis,
    Mysql,
    Unsupported,
}

// === impl Service ===

impl Service {
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.attributes.namespace
    }

    pub fn port(&self, number: u16) -> Option<&Port> {
        self.ports.iter().find(|p| p.port == number)
    }

    /// Returns a copy of this service that only exposes the given port, if the service exposes
    /// it at all.
    pub fn narrowed_to(&self, number: u16) -> Option<Self> {
        let port = self.port(number)?.clone();
        Some(Self {
            hostname: self.hostname.clone(),
            ports: vec![port],
            attributes: self.attributes.clone(),
        })
    }
}

// === impl Protocol ===

impl Protocol {
    /// Parses a protocol name case-insensitively. Unknown names are `Unsupported`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "grpc" => Self::Grpc,
            "grpc-web" => Self::GrpcWeb,
            "http" => Self::Http,
            "http_proxy" => Self::HttpProxy,
            "http2" => Self::Http2,
            "https" => Self::Https,
            "tcp" => Self::Tcp,
            "tls" => Self::Tls,
            "udp" => Self::Udp,
            "mongo" => Self::Mongo,
            "redis" => Self::Redis,
            "mysql" => Self::Mysql,
            _ => Self::Unsupported,
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(
            self,
            Self::Grpc | Self::GrpcWeb | Self::Http | Self::Http2 | Self::HttpProxy
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grpc => "GRPC",
            Self::GrpcWeb => "GRPC-Web",
            Self::Http => "HTTP",
            Self::HttpProxy => "HTTP_PROXY",
            Self::Http2 => "HTTP2",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
            Self::Tls => "TLS",
            Self::Udp => "UDP",
            Self::Mongo => "Mongo",
            Self::Redis => "Redis",
            Self::Mysql => "MySQL",
            Self::Unsupported => "UnsupportedProtocol",
        }
    }
}

impl FromStr for Protocol {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}
