//! Default nodes shipped for every network group
//!
//! These are seeded at first launch and restored by a group reset.

use super::{Node, NodeOrigin, Scheme};
use crate::config::NetworkGroup;

/// Get default nodes for a group
pub fn default_nodes(group: NetworkGroup) -> Vec<Node> {
    match group {
        NetworkGroup::Adm => adm_nodes(),
        NetworkGroup::Btc => btc_nodes(),
        NetworkGroup::Eth => eth_nodes(),
        NetworkGroup::KlyNode => kly_nodes(),
        NetworkGroup::KlyService => kly_service_nodes(),
        NetworkGroup::Doge => doge_nodes(),
        NetworkGroup::Dash => dash_nodes(),
        NetworkGroup::Ipfs => ipfs_nodes(),
        NetworkGroup::InfoService => info_service_nodes(),
    }
}

fn https(host: &str) -> NodeOrigin {
    NodeOrigin::new(Scheme::Https, host, None)
}

fn http(host: &str, port: u16) -> NodeOrigin {
    NodeOrigin::new(Scheme::Http, host, Some(port))
}

/// ADAMANT ledger nodes
fn adm_nodes() -> Vec<Node> {
    let g = NetworkGroup::Adm;
    vec![
        Node::default_for(g, https("clown.adamant.im")),
        Node::default_for(g, https("lake.adamant.im")),
        Node::default_for(g, https("endless.adamant.im"))
            .with_alt_origin(http("149.102.157.15", 36666)),
        Node::default_for(g, https("bid.adamant.im")),
        Node::default_for(g, https("unusual.adamant.im")),
        Node::default_for(g, https("debate.adamant.im"))
            .with_alt_origin(http("95.216.161.113", 36666)),
        Node::default_for(g, http("78.47.205.206", 36666)),
        Node::default_for(g, http("5.161.53.74", 36666)),
        Node::default_for(g, http("184.94.215.92", 45555)),
        Node::default_for(g, https("node1.adamant.business"))
            .with_alt_origin(http("194.233.75.29", 45555)),
        Node::default_for(g, https("node2.blockchain2fa.io")),
        Node::default_for(g, https("phecda.adm.im")).with_alt_origin(http("46.250.234.248", 36666)),
        Node::default_for(g, https("tegmine.adm.im")).with_alt_origin(http("107.161.26.92", 36666)),
        Node::default_for(g, https("tauri.adm.im")).with_alt_origin(http("154.26.159.245", 36666)),
        Node::default_for(g, https("dschubba.adm.im")).with_alt_origin(http("167.235.150.148", 36666)),
        Node::default_for(g, https("tauri.bid.adamant.im")).hidden(),
    ]
}

/// Bitcoin nodes
fn btc_nodes() -> Vec<Node> {
    let g = NetworkGroup::Btc;
    vec![
        Node::default_for(g, https("btcnode1.adamant.im")).with_alt_origin(http("37.27.205.78", 44099)),
        Node::default_for(g, https("btcnode3.adamant.im")).with_alt_origin(http("195.201.242.108", 44099)),
    ]
}

/// Ethereum nodes
fn eth_nodes() -> Vec<Node> {
    let g = NetworkGroup::Eth;
    vec![
        Node::default_for(g, https("ethnode2.adamant.im")).with_alt_origin(http("95.216.114.252", 44099)),
        Node::default_for(g, https("ethnode3.adamant.im")).with_alt_origin(http("46.4.37.157", 44099)),
    ]
}

/// Klayr core nodes
fn kly_nodes() -> Vec<Node> {
    let g = NetworkGroup::KlyNode;
    vec![
        Node::default_for(g, https("klynode1.adamant.im")).with_alt_origin(http("109.176.199.130", 44099)),
        Node::default_for(g, https("klynode2.adamant.im")).with_alt_origin(http("172.104.165.142", 44099)),
    ]
}

/// Klayr indexer service nodes
fn kly_service_nodes() -> Vec<Node> {
    let g = NetworkGroup::KlyService;
    vec![
        Node::default_for(g, https("klyservice1.adamant.im")).with_alt_origin(http("109.176.199.130", 44098)),
        Node::default_for(g, https("klyservice2.adamant.im")).with_alt_origin(http("172.104.165.142", 44098)),
    ]
}

/// Dogecoin nodes
fn doge_nodes() -> Vec<Node> {
    let g = NetworkGroup::Doge;
    vec![
        Node::default_for(g, https("dogenode1.adamant.im")).with_alt_origin(http("5.9.99.62", 44099)),
        Node::default_for(g, https("dogenode2.adamant.im")).with_alt_origin(http("176.9.32.126", 44098)),
        Node::default_for(g, https("dogenode3.adm.im")).with_alt_origin(http("95.216.45.88", 44098)),
    ]
}

/// Dash nodes
fn dash_nodes() -> Vec<Node> {
    let g = NetworkGroup::Dash;
    vec![
        Node::default_for(g, https("dashnode1.adamant.im")).with_alt_origin(http("45.85.147.224", 44099)),
        Node::default_for(g, https("dashnode2.adamant.im")).with_alt_origin(http("207.180.210.95", 44099)),
    ]
}

/// File storage gateways
fn ipfs_nodes() -> Vec<Node> {
    let g = NetworkGroup::Ipfs;
    vec![
        Node::default_for(g, https("ipfs4.adm.im")).with_alt_origin(http("95.216.45.88", 44099)),
        Node::default_for(g, https("ipfs5.adamant.im")).with_alt_origin(http("62.72.43.99", 44099)),
        Node::default_for(g, https("ipfs6.adamant.business")).with_alt_origin(http("75.119.138.235", 44099)),
    ]
}

/// Currency info service
fn info_service_nodes() -> Vec<Node> {
    vec![Node::default_for(NetworkGroup::InfoService, https("info2.adm.im"))]
}
