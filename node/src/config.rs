//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use meshgate_admission::PollPolicy;
use meshgate_types::NodeType;

use crate::NodeError;

/// Configuration for a meshgate node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Interface the HTTP server binds to.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Tier of this node; passed to the ledger as the admitting node type.
    #[serde(default = "default_node_type")]
    pub node_type: NodeType,

    /// Registry snapshot and received bootstrap files live here.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Interpreter that runs the ledger command script.
    #[serde(default = "default_ledger_program")]
    pub ledger_program: PathBuf,

    #[serde(default = "default_ledger_script")]
    pub ledger_script: PathBuf,

    /// Directory the ledger script is run from, if not the current one.
    #[serde(default)]
    pub ledger_working_dir: Option<PathBuf>,

    /// Upper bound on a single ledger call.
    #[serde(default = "default_ledger_timeout_secs")]
    pub ledger_timeout_secs: u64,

    /// JSON-RPC endpoint of the local ledger node (contact descriptor lookup).
    #[serde(default = "default_ledger_rpc_url")]
    pub ledger_rpc_url: String,

    /// Local registry contract descriptor. Must exist for the contract to
    /// count as deployed; also shipped to newly registered nodes.
    #[serde(default = "default_contract_artifact")]
    pub contract_artifact: PathBuf,

    #[serde(default = "default_genesis_file")]
    pub genesis_file: PathBuf,

    #[serde(default)]
    pub prefunded_keys_file: Option<PathBuf>,

    /// This node's own signed identity, written when it registers itself.
    #[serde(default = "default_peer_record_file")]
    pub peer_record_file: PathBuf,

    /// Capability token validity period.
    #[serde(default = "default_token_validity_secs")]
    pub token_validity_secs: u64,

    /// Proposal listener tick.
    #[serde(default = "default_listener_interval_secs")]
    pub listener_interval_secs: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to expose the Prometheus metrics endpoint.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Must stay the last field: TOML tables follow plain values.
    #[serde(default)]
    pub admission: AdmissionConfig,
}

/// Bounds on the two waits of a validator admission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "PollPolicy::peer_wait")]
    pub peer_wait: PollPolicy,
    #[serde(default = "PollPolicy::convergence_wait")]
    pub convergence_wait: PollPolicy,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            peer_wait: PollPolicy::peer_wait(),
            convergence_wait: PollPolicy::convergence_wait(),
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_node_type() -> NodeType {
    NodeType::Cloud
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./meshgate_data")
}

fn default_ledger_program() -> PathBuf {
    PathBuf::from("node")
}

fn default_ledger_script() -> PathBuf {
    PathBuf::from("interact.js")
}

fn default_ledger_timeout_secs() -> u64 {
    60
}

fn default_ledger_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_contract_artifact() -> PathBuf {
    PathBuf::from("data/NodeRegistry.json")
}

fn default_genesis_file() -> PathBuf {
    PathBuf::from("genesis/genesis.json")
}

fn default_peer_record_file() -> PathBuf {
    PathBuf::from("node-details.json")
}

fn default_token_validity_secs() -> u64 {
    360_000
}

fn default_listener_interval_secs() -> u64 {
    10
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, NodeError> {
        format!("{}:{}", self.listen_host, self.port)
            .parse()
            .map_err(|e| NodeError::Config(format!("invalid listen address: {e}")))
    }

    /// Snapshot of the nodes this node has admitted.
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    /// Where received bootstrap acknowledgements are stored.
    pub fn bootstrap_dir(&self) -> PathBuf {
        self.data_dir.join("bootstrap")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            port: default_port(),
            node_type: default_node_type(),
            data_dir: default_data_dir(),
            ledger_program: default_ledger_program(),
            ledger_script: default_ledger_script(),
            ledger_working_dir: None,
            ledger_timeout_secs: default_ledger_timeout_secs(),
            ledger_rpc_url: default_ledger_rpc_url(),
            contract_artifact: default_contract_artifact(),
            genesis_file: default_genesis_file(),
            prefunded_keys_file: None,
            peer_record_file: default_peer_record_file(),
            token_validity_secs: default_token_validity_secs(),
            listener_interval_secs: default_listener_interval_secs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
            admission: AdmissionConfig::default(),
        }
    }
}
