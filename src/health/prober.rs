//! Health prober: one lightweight status call per origin

use super::transport::{Request, Transport};
use crate::config::NetworkGroup;
use crate::error::ProbeError;
use crate::node::{Node, NodeOrigin, OriginPreference};
use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Measurements of one successful probe
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSample {
    /// Wall-clock round trip of the status call
    pub ping: Duration,
    /// Reported block height (0 when the service has no chain)
    pub height: u64,
    pub version: Option<Version>,
    pub ws_enabled: bool,
    pub ws_port: Option<u16>,
}

/// Probe one origin. Stateless and safe to call concurrently.
///
/// Implementations do not retry; retry policy belongs to the scheduler.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, origin: &NodeOrigin) -> Result<HealthSample, ProbeError>;
}

/// Status call flavour of a network group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusProtocol {
    /// `GET /api/node/status` of the native ledger
    NativeRest,
    /// JSON-RPC batch of `getnetworkinfo` and `getblockchaininfo`
    BitcoinRpc,
    /// JSON-RPC batch of `eth_blockNumber` and `web3_clientVersion`
    EthereumRpc,
    /// Klayr core `system_getNodeInfo` over JSON-RPC
    KlayrRpc,
    /// Klayr service `GET /api/v3/fees`, height from `meta`
    KlayrService,
    /// Plain service status endpoint reporting a version and maybe a height
    ServiceRest { path: &'static str },
}

impl StatusProtocol {
    pub fn for_group(group: NetworkGroup) -> Self {
        match group {
            NetworkGroup::Adm => StatusProtocol::NativeRest,
            NetworkGroup::Btc | NetworkGroup::Doge | NetworkGroup::Dash => {
                StatusProtocol::BitcoinRpc
            }
            NetworkGroup::Eth => StatusProtocol::EthereumRpc,
            NetworkGroup::KlyNode => StatusProtocol::KlayrRpc,
            NetworkGroup::KlyService => StatusProtocol::KlayrService,
            NetworkGroup::Ipfs => StatusProtocol::ServiceRest {
                path: "/api/node/info",
            },
            NetworkGroup::InfoService => StatusProtocol::ServiceRest { path: "/status" },
        }
    }

    fn request(&self) -> Request {
        match self {
            StatusProtocol::NativeRest => Request::get("/api/node/status"),
            StatusProtocol::BitcoinRpc => Request::post_json(
                "",
                json!([
                    {"jsonrpc": "1.0", "id": "getnetworkinfo", "method": "getnetworkinfo", "params": []},
                    {"jsonrpc": "1.0", "id": "getblockchaininfo", "method": "getblockchaininfo", "params": []}
                ]),
            ),
            StatusProtocol::EthereumRpc => Request::post_json(
                "",
                json!([
                    {"jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber", "params": []},
                    {"jsonrpc": "2.0", "id": 2, "method": "web3_clientVersion", "params": []}
                ]),
            ),
            StatusProtocol::KlayrRpc => Request::post_json(
                "/rpc",
                json!({"jsonrpc": "2.0", "id": 1, "method": "system_getNodeInfo", "params": {}}),
            ),
            StatusProtocol::KlayrService => Request::get("/api/v3/fees"),
            StatusProtocol::ServiceRest { path } => Request::get(*path),
        }
    }

    /// Decode a status response body
    pub fn parse(&self, body: &[u8]) -> Result<ParsedStatus, ProbeError> {
        match self {
            StatusProtocol::NativeRest => parse_native(body),
            StatusProtocol::BitcoinRpc => parse_bitcoin(body),
            StatusProtocol::EthereumRpc => parse_ethereum(body),
            StatusProtocol::KlayrRpc => parse_klayr(body),
            StatusProtocol::KlayrService => parse_klayr_service(body),
            StatusProtocol::ServiceRest { .. } => parse_service(body),
        }
    }
}

/// Status fields decoded from a response, before timing is attached
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedStatus {
    pub height: u64,
    pub version: Option<Version>,
    pub ws_enabled: bool,
    pub ws_port: Option<u16>,
}

impl ParsedStatus {
    fn into_sample(self, ping: Duration) -> HealthSample {
        HealthSample {
            ping,
            height: self.height,
            version: self.version,
            ws_enabled: self.ws_enabled,
            ws_port: self.ws_port,
        }
    }
}

/// Prober speaking a group's status protocol through a [`Transport`]
pub struct StatusProber {
    transport: Arc<dyn Transport>,
    protocol: StatusProtocol,
    timeout: Duration,
}

impl StatusProber {
    pub fn new(transport: Arc<dyn Transport>, protocol: StatusProtocol, timeout: Duration) -> Self {
        Self {
            transport,
            protocol,
            timeout,
        }
    }

    /// Prober for a group's default protocol
    pub fn for_group(group: NetworkGroup, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self::new(transport, StatusProtocol::for_group(group), timeout)
    }
}

#[async_trait]
impl Prober for StatusProber {
    async fn probe(&self, origin: &NodeOrigin) -> Result<HealthSample, ProbeError> {
        let request = self.protocol.request().with_timeout(self.timeout);

        let started = Instant::now();
        let response = self.transport.send(origin, &request).await?;
        let ping = started.elapsed();

        let parsed = self.protocol.parse(&response.body)?;
        Ok(parsed.into_sample(ping))
    }
}

/// Probe a node on its preferred origin, falling back to the other one.
///
/// Only a network failure on the preferred origin moves on to the other
/// origin. Returns which origin answered.
pub async fn probe_node(
    prober: &dyn Prober,
    node: &Node,
) -> Result<(HealthSample, OriginPreference), ProbeError> {
    let first = prober.probe(node.preferred_origin()).await;

    match (first, node.other_origin()) {
        (Ok(sample), _) => Ok((sample, node.preferred)),
        (Err(ProbeError::Network(reason)), Some((other, origin))) => {
            tracing::debug!(
                node = %node.id,
                origin = %node.preferred_origin(),
                reason = %reason,
                "preferred origin unreachable, trying {}", origin
            );
            let sample = prober.probe(origin).await?;
            Ok((sample, other))
        }
        (Err(e), _) => Err(e),
    }
}

/// Extract a version from free-form strings such as `/Satoshi:25.0.0/`,
/// `v20.0.2-dirty` or `Geth/v1.13.5-stable/linux-amd64`.
pub fn parse_version_lenient(raw: &str) -> Option<Version> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let tail = &raw[start..];
    let end = tail
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(tail.len());

    let mut parts = tail[..end]
        .split('.')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u64>().ok());

    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

// ============================================================================
// Response formats
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeStatus {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    network: Option<NativeNetwork>,
    #[serde(default)]
    version: Option<NativeVersion>,
    #[serde(default)]
    ws_client: Option<NativeWsClient>,
}

#[derive(Deserialize)]
struct NativeNetwork {
    height: u64,
}

#[derive(Deserialize)]
struct NativeVersion {
    version: String,
}

#[derive(Deserialize)]
struct NativeWsClient {
    enabled: bool,
    #[serde(default)]
    port: Option<u16>,
}

fn parse_native(body: &[u8]) -> Result<ParsedStatus, ProbeError> {
    let status: NativeStatus = serde_json::from_slice(body)?;
    if status.success == Some(false) {
        return Err(ProbeError::Rejected("node reported success=false".into()));
    }

    let ws = status.ws_client;
    Ok(ParsedStatus {
        height: status.network.map(|n| n.height).unwrap_or_default(),
        version: status
            .version
            .and_then(|v| parse_version_lenient(&v.version)),
        ws_enabled: ws.as_ref().map(|w| w.enabled).unwrap_or(false),
        ws_port: ws.and_then(|w| w.port),
    })
}

#[derive(Deserialize)]
struct RpcReply {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

fn rpc_result<'a>(replies: &'a [RpcReply], id: Value) -> Result<&'a Value, ProbeError> {
    let reply = replies
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| ProbeError::Parse(format!("missing reply for {}", id)))?;

    if !reply.error.is_null() {
        return Err(ProbeError::Rejected(reply.error.to_string()));
    }
    Ok(&reply.result)
}

fn parse_bitcoin(body: &[u8]) -> Result<ParsedStatus, ProbeError> {
    let replies: Vec<RpcReply> = serde_json::from_slice(body)?;
    let network = rpc_result(&replies, json!("getnetworkinfo"))?;
    let chain = rpc_result(&replies, json!("getblockchaininfo"))?;

    let height = chain["blocks"]
        .as_u64()
        .ok_or_else(|| ProbeError::Parse("getblockchaininfo without blocks".into()))?;

    // Dash reports `buildversion`, Bitcoin and Dogecoin only `subversion`
    let version = network["buildversion"]
        .as_str()
        .or_else(|| network["subversion"].as_str())
        .and_then(parse_version_lenient);

    Ok(ParsedStatus {
        height,
        version,
        ..Default::default()
    })
}

fn parse_hex_u64(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

fn parse_ethereum(body: &[u8]) -> Result<ParsedStatus, ProbeError> {
    let replies: Vec<RpcReply> = serde_json::from_slice(body)?;
    let block = rpc_result(&replies, json!(1))?;
    let client = rpc_result(&replies, json!(2))?;

    let height = block
        .as_str()
        .and_then(parse_hex_u64)
        .ok_or_else(|| ProbeError::Parse(format!("bad eth_blockNumber result: {}", block)))?;

    Ok(ParsedStatus {
        height,
        version: client.as_str().and_then(parse_version_lenient),
        ..Default::default()
    })
}

fn parse_klayr(body: &[u8]) -> Result<ParsedStatus, ProbeError> {
    let reply: RpcReply = serde_json::from_slice(body)?;
    if !reply.error.is_null() {
        return Err(ProbeError::Rejected(reply.error.to_string()));
    }

    let height = reply.result["height"]
        .as_u64()
        .ok_or_else(|| ProbeError::Parse("system_getNodeInfo without height".into()))?;

    Ok(ParsedStatus {
        height,
        version: reply.result["version"]
            .as_str()
            .and_then(parse_version_lenient),
        ..Default::default()
    })
}

fn parse_klayr_service(body: &[u8]) -> Result<ParsedStatus, ProbeError> {
    let value: Value = serde_json::from_slice(body)?;
    let height = value["meta"]["lastBlockHeight"]
        .as_u64()
        .ok_or_else(|| ProbeError::Parse("fees response without meta.lastBlockHeight".into()))?;

    Ok(ParsedStatus {
        height,
        ..Default::default()
    })
}

fn parse_service(body: &[u8]) -> Result<ParsedStatus, ProbeError> {
    let value: Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(ProbeError::Parse("status response is not an object".into()));
    }

    Ok(ParsedStatus {
        height: value["height"].as_u64().unwrap_or_default(),
        version: value["version"].as_str().and_then(parse_version_lenient),
        ..Default::default()
    })
}
