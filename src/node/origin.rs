//! Node origins: where requests are sent

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// URL scheme of an origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http | Scheme::Ws => 80,
            Scheme::Https | Scheme::Wss => 443,
        }
    }

    /// Websocket counterpart of an HTTP scheme
    pub fn websocket(&self) -> Scheme {
        match self {
            Scheme::Http | Scheme::Ws => Scheme::Ws,
            Scheme::Https | Scheme::Wss => Scheme::Wss,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            "ws" => Some(Scheme::Ws),
            "wss" => Some(Scheme::Wss),
            _ => None,
        }
    }
}

/// Scheme, host and port of a node.
///
/// Origins are normalized on construction (lowercase host, default port
/// dropped) so derived equality matches equality of the normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeOrigin {
    pub scheme: Scheme,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl NodeOrigin {
    /// Create a normalized origin
    pub fn new(scheme: Scheme, host: impl Into<String>, port: Option<u16>) -> Self {
        let host = host.into().trim().trim_end_matches('/').to_lowercase();
        let port = port.filter(|p| *p != scheme.default_port());
        Self { scheme, host, port }
    }

    /// Parse an origin from a URL string; a missing scheme means https
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let url =
            Url::parse(&with_scheme).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", raw, e)))?;

        let scheme = Scheme::parse(url.scheme())
            .ok_or_else(|| ConfigError::InvalidUrl(format!("unsupported scheme in {}", raw)))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::InvalidUrl(format!("missing host in {}", raw)))?;

        Ok(Self::new(scheme, host, url.port()))
    }

    /// Effective port, falling back to the scheme default
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Normalized URL without trailing slash
    pub fn as_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme.as_str(), self.host, port),
            None => format!("{}://{}", self.scheme.as_str(), self.host),
        }
    }

    /// Join a request path onto this origin
    pub fn join(&self, path: &str) -> String {
        if path.is_empty() {
            return self.as_url();
        }
        format!("{}/{}", self.as_url(), path.trim_start_matches('/'))
    }

    /// Websocket origin on the same host, optionally on another port
    pub fn websocket(&self, ws_port: Option<u16>) -> Self {
        let scheme = self.scheme.websocket();
        Self::new(scheme, self.host.clone(), ws_port.or(self.port))
    }
}

impl fmt::Display for NodeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_url())
    }
}
