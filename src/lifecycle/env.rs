//! Connection variables injected into tester containers.

use std::collections::BTreeMap;

use crate::config::{BOOTSTRAP_PEER_ID, BOOTSTRAP_PORT, RPC_PORT};
use crate::lifecycle::RunningBackend;

pub const RPC_HOST_VAR: &str = "TUPELO_RPC_HOST";
pub const BOOTSTRAP_NODES_VAR: &str = "TUPELO_BOOTSTRAP_NODES";
pub const VERSION_VAR: &str = "TUPELO_VERSION";

/// `TUPELO_RPC_HOST` value.
pub fn rpc_host_value(host: &str) -> String {
    format!("{}:{}", host, RPC_PORT)
}

/// `TUPELO_BOOTSTRAP_NODES` value, a libp2p multiaddr.
pub fn bootstrap_nodes_value(host: &str) -> String {
    format!("/ip4/{}/tcp/{}/ipfs/{}", host, BOOTSTRAP_PORT, BOOTSTRAP_PEER_ID)
}

/// The tester's declared variables overlaid with the running backend's
/// connection details.
pub fn tester_environment(
    declared: &BTreeMap<String, String>,
    backend: &RunningBackend,
) -> BTreeMap<String, String> {
    let mut env = declared.clone();
    env.insert(RPC_HOST_VAR.to_string(), rpc_host_value(&backend.rpc_host));
    if let Some(bootstrap) = backend.bootstrap_host.as_deref().filter(|h| !h.is_empty()) {
        env.insert(BOOTSTRAP_NODES_VAR.to_string(), bootstrap_nodes_value(bootstrap));
    }
    env.insert(VERSION_VAR.to_string(), backend.version.clone());
    env
}
