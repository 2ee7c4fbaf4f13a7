//! Transport primitive: one call against one origin
//!
//! The engine never opens sockets itself. Everything network-bound goes
//! through a [`Transport`], which the application supplies (or uses
//! [`HttpTransport`]).

use crate::error::{CallError, Error, Result};
use crate::node::NodeOrigin;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP method of a request description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// What to send, independent of where
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the origin
    pub path: String,
    /// JSON body for POST requests
    pub body: Option<serde_json::Value>,
    /// Overrides the transport's default timeout
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            timeout: None,
        }
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            timeout: None,
        }
    }

    /// Builder-style setter for timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful (2xx) response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, CallError> {
        serde_json::from_slice(&self.body).map_err(|e| CallError::Malformed(e.to_string()))
    }
}

/// Issue one network call against a given origin.
///
/// Implementations must not retry, must enforce a bounded timeout, and must
/// report non-2xx responses as [`CallError::Rejected`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        origin: &NodeOrigin,
        request: &Request,
    ) -> std::result::Result<RawResponse, CallError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    timeout: Duration,
}

/// Longest error body kept in a rejection message
const MAX_ERROR_BODY: usize = 256;

impl HttpTransport {
    /// Create a transport with a default per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, timeout })
    }

    /// Default per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn map_reqwest_error(err: reqwest::Error) -> CallError {
    if err.is_timeout() {
        CallError::Timeout
    } else if err.is_decode() || err.is_body() {
        CallError::Malformed(err.to_string())
    } else {
        CallError::Connection(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        origin: &NodeOrigin,
        request: &Request,
    ) -> std::result::Result<RawResponse, CallError> {
        let url = origin.join(&request.path);

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder = builder.timeout(request.timeout.unwrap_or(self.timeout));

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let message: String = text.chars().take(MAX_ERROR_BODY).collect();
            tracing::debug!(url = %url, status = status.as_u16(), "request rejected");
            return Err(CallError::rejected(status.as_u16(), message));
        }

        Ok(RawResponse::new(status.as_u16(), body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_request_builders() {
        let req = Request::get("/api/node/status").with_timeout(Duration::from_secs(3));
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.timeout, Some(Duration::from_secs(3)));

        let req = Request::post_json("", serde_json::json!({"method": "getblockcount"}));
        assert_eq!(req.method, Method::Post);
        assert!(req.body.is_some());
    }

    #[test]
    fn test_raw_response_json() {
        #[derive(Deserialize)]
        struct Height {
            height: u64,
        }

        let ok = RawResponse::new(200, br#"{"height": 7}"#.to_vec());
        assert_eq!(ok.json::<Height>().unwrap().height, 7);

        let bad = RawResponse::new(200, b"<html>".to_vec());
        assert!(matches!(bad.json::<Height>(), Err(CallError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_network_error() {
        let transport = HttpTransport::new(Duration::from_millis(500)).unwrap();
        // Port 9 on localhost is discard; nothing listens there in test environments
        let origin = NodeOrigin::new(crate::node::Scheme::Http, "127.0.0.1", Some(9));
        let err = transport
            .send(&origin, &Request::get("/"))
            .await
            .unwrap_err();
        assert!(err.is_network(), "unexpected error: {:?}", err);
    }
}
