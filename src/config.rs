//! Startup configuration (C9), loaded from a TOML file the way the
//! source loaded `config.yaml`, just with `toml`+`serde` in place of
//! a hand-rolled YAML reader.

use crate::error::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

fn default_outbound_rpc_timeout_ms() -> u32 {
    10_000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeHost {
    pub url: String,
    pub api_port: u16,
    pub rpc_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub election_timeout: u32,
    pub election_timeout_jitter: u32,
    pub leader_heartbeat_period: u32,
    pub node_id: String,
    pub node_hosts: HashMap<String, NodeHost>,
    #[serde(default = "default_outbound_rpc_timeout_ms")]
    pub outbound_rpc_timeout: u32,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| crate::error::RaftError::Storage(format!("reading {}: {e}", path.as_ref().display())))?;
        toml::from_str(&raw).map_err(|e| crate::error::RaftError::Decode(e.to_string()))
    }

    /// The peer ids to replicate to: every configured node except self.
    pub fn peer_ids(&self) -> Vec<String> {
        self.node_hosts
            .keys()
            .filter(|id| *id != &self.node_id)
            .cloned()
            .collect()
    }
}
