//! node-sentinel - Node health checking, selection and request failover
//!
//! Keeps a pool of candidate nodes per network group, probes them in the
//! background, picks the best one for every request, and transparently fails
//! over to the next node when one stops answering.
//!
//! # Example
//!
//! ```rust,no_run
//! use node_sentinel::{ConfigFile, NetworkGroup, NodeEngine, RawResponse, Request, Transport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigFile::load_default()?.unwrap_or_default();
//!     let engine = NodeEngine::open(&config)?;
//!     let scheduler = engine.start();
//!
//!     let transport = Arc::new(node_sentinel::HttpTransport::new(config.request_timeout())?);
//!     let status: RawResponse = engine
//!         .perform(NetworkGroup::Adm, false, |origin| {
//!             let transport = transport.clone();
//!             async move {
//!                 transport
//!                     .send(&origin, &Request::get("/api/blocks/getHeight"))
//!                     .await
//!             }
//!         })
//!         .await?;
//!
//!     println!("HTTP {}", status.status);
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod failover;
pub mod health;
pub mod node;
pub mod registry;
pub mod selector;
pub mod status;

// Re-exports for convenience
pub use config::{ConfigFile, GroupOverride, GroupParams, NetworkGroup, ParamsTable, Settings};
pub use engine::NodeEngine;
pub use error::{CallError, ConfigError, Error, ProbeError, RequestError, Result, StoreError};
pub use failover::Failover;
pub use health::{
    classify, probe_node, HealthSample, HealthScheduler, HttpTransport, Method, Prober,
    RawResponse, Request, SchedulerHandle, StatusProber, StatusProtocol, Transport, Trigger,
};
pub use node::{
    default_nodes, ConnectionStatus, Node, NodeId, NodeKind, NodeOrigin, OriginPreference,
    RejectedReason, Scheme,
};
pub use registry::{
    merge_with_defaults, DefaultsProvider, FileNodeStore, MemoryNodeStore, NodeRegistry,
    NodeStore, PersistedNodes,
};
pub use selector::{Selection, SelectionParams};
pub use status::NodesListInfo;
