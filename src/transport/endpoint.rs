use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use url::{Host, Url};

use crate::error::TransportError;

pub const DEFAULT_ENDPOINT: &str = "tcp://127.0.0.1:5555";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
}

impl Scheme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
        }
    }
}

/// Queue address of the form `scheme://host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.host.parse::<Ipv6Addr>().is_ok()
    }

    /// Address handed to `bind`; port 0 asks for an ephemeral port.
    pub fn bind_address(&self) -> String {
        if self.port == 0 {
            format!("{}://{}:*", self.scheme.as_str(), self.host_part())
        } else {
            self.to_string()
        }
    }

    fn host_part(&self) -> String {
        if self.is_ipv6() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(Scheme::Tcp, "127.0.0.1", 5555)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host_part(), self.port)
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidEndpoint(s.to_owned());

        let url = Url::parse(s).map_err(|_| invalid())?;
        let scheme = match url.scheme() {
            "tcp" => Scheme::Tcp,
            other => return Err(TransportError::UnsupportedScheme(other.to_owned())),
        };
        if !url.path().is_empty() || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid());
        }

        let host = match url.host().ok_or_else(invalid)? {
            Host::Domain(name) => name.to_owned(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port = url.port().ok_or_else(invalid)?;

        Ok(Self::new(scheme, host, port))
    }
}
