//! meshgate daemon: runs a node, or acts as a client of a registrar.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use meshgate_crypto::{derive_address, load_private_key, sign_identity};
use meshgate_node::{init_logging, LogFormat, MeshNode, NodeConfig};
use meshgate_rpc::MeshClient;
use meshgate_store::PeerRecord;
use meshgate_types::{Action, NodeIdentity, NodeType, Signature, SignedIdentity};

#[derive(Parser)]
#[command(name = "meshgate", about = "IoT mesh admission and access control")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a node.
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Talk to a registrar.
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT/SIGTERM.
    Run(RunArgs),
}

/// Node settings. When `--config` is given the file is the base;
/// flags and env vars override it.
#[derive(Args, Default)]
struct RunArgs {
    /// Path to a TOML configuration file.
    #[arg(long, env = "MESHGATE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "MESHGATE_LISTEN_HOST")]
    listen_host: Option<String>,

    #[arg(long, env = "MESHGATE_PORT")]
    port: Option<u16>,

    /// Tier of this node: edge, fog or cloud.
    #[arg(long, env = "MESHGATE_NODE_TYPE")]
    node_type: Option<NodeType>,

    #[arg(long, env = "MESHGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, env = "MESHGATE_LEDGER_PROGRAM")]
    ledger_program: Option<PathBuf>,

    #[arg(long, env = "MESHGATE_LEDGER_SCRIPT")]
    ledger_script: Option<PathBuf>,

    #[arg(long, env = "MESHGATE_LEDGER_RPC_URL")]
    ledger_rpc_url: Option<String>,

    #[arg(long, env = "MESHGATE_CONTRACT_ARTIFACT")]
    contract_artifact: Option<PathBuf>,

    #[arg(long, env = "MESHGATE_GENESIS_FILE")]
    genesis_file: Option<PathBuf>,

    #[arg(long, env = "MESHGATE_PREFUNDED_KEYS_FILE")]
    prefunded_keys_file: Option<PathBuf>,

    #[arg(long, env = "MESHGATE_PEER_RECORD")]
    peer_record: Option<PathBuf>,

    #[arg(long, env = "MESHGATE_TOKEN_VALIDITY_SECS")]
    token_validity_secs: Option<u64>,

    /// Enable the Prometheus metrics endpoint.
    #[arg(long, env = "MESHGATE_ENABLE_METRICS")]
    metrics: bool,

    /// Log format: "human" or "json".
    #[arg(long, env = "MESHGATE_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "MESHGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl RunArgs {
    fn apply(self, base: NodeConfig) -> NodeConfig {
        NodeConfig {
            listen_host: self.listen_host.unwrap_or(base.listen_host),
            port: self.port.unwrap_or(base.port),
            node_type: self.node_type.unwrap_or(base.node_type),
            data_dir: self.data_dir.unwrap_or(base.data_dir),
            ledger_program: self.ledger_program.unwrap_or(base.ledger_program),
            ledger_script: self.ledger_script.unwrap_or(base.ledger_script),
            ledger_rpc_url: self.ledger_rpc_url.unwrap_or(base.ledger_rpc_url),
            contract_artifact: self.contract_artifact.unwrap_or(base.contract_artifact),
            genesis_file: self.genesis_file.unwrap_or(base.genesis_file),
            prefunded_keys_file: self.prefunded_keys_file.or(base.prefunded_keys_file),
            peer_record_file: self.peer_record.unwrap_or(base.peer_record_file),
            token_validity_secs: self.token_validity_secs.unwrap_or(base.token_validity_secs),
            enable_metrics: self.metrics || base.enable_metrics,
            log_format: self.log_format.unwrap_or(base.log_format),
            log_level: self.log_level.unwrap_or(base.log_level),
            ..base
        }
    }
}

#[derive(Subcommand)]
enum ClientAction {
    /// Sign this node's identity and register it with a registrar.
    Register {
        #[arg(long)]
        node_id: String,
        #[arg(long)]
        node_name: String,
        #[arg(long)]
        node_type: NodeType,
        /// File holding the hex private key.
        #[arg(long)]
        key_file: PathBuf,
        /// Base URL of the registrar.
        #[arg(long, env = "MESHGATE_REGISTRAR")]
        registrar: String,
        /// Base URL the registrar pushes the bootstrap acknowledgement to.
        #[arg(long)]
        callback_url: String,
        #[arg(long)]
        rpc_url: Option<String>,
        /// Where the signed identity is stored for later access requests.
        #[arg(long, default_value = "node-details.json")]
        peer_record: PathBuf,
    },

    /// Ask a registrar whether this node may perform an action.
    Access {
        /// read, write, execute or transmit.
        action: Action,
        #[arg(long, env = "MESHGATE_REGISTRAR")]
        registrar: String,
        /// Signed identity written by `client register`.
        #[arg(long, default_value = "node-details.json")]
        peer_record: PathBuf,
        /// Overrides the signature from the peer record.
        #[arg(long)]
        signature: Option<Signature>,
        /// Overrides the node id from the peer record.
        #[arg(long)]
        node_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Node {
            action: NodeAction::Run(args),
        } => run_node(args).await,
        Command::Client { action } => {
            meshgate_utils::init_tracing("warn");
            run_client(action).await
        }
    }
}

async fn run_node(args: RunArgs) -> anyhow::Result<()> {
    let base = match &args.config {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => NodeConfig::default(),
    };
    let config = args.apply(base);

    let format: LogFormat = config.log_format.parse().map_err(|e: String| anyhow!(e))?;
    init_logging(format, &config.log_level)?;

    tracing::info!(
        listen = %format!("{}:{}", config.listen_host, config.port),
        node_type = %config.node_type,
        metrics = config.enable_metrics,
        "starting meshgate node"
    );

    let node = MeshNode::new(config)?;
    node.run().await?;

    tracing::info!("meshgate daemon exited cleanly");
    Ok(())
}

async fn run_client(action: ClientAction) -> anyhow::Result<()> {
    match action {
        ClientAction::Register {
            node_id,
            node_name,
            node_type,
            key_file,
            registrar,
            callback_url,
            rpc_url,
            peer_record,
        } => {
            let kp = load_private_key(&key_file)
                .with_context(|| format!("loading key {}", key_file.display()))?;
            let identity = NodeIdentity {
                node_id,
                node_name,
                node_type,
                address: derive_address(&kp.public),
                public_key: kp.public,
                callback_url,
                rpc_url,
            };
            let signature = sign_identity(&identity, &kp.private);
            let signed = SignedIdentity {
                identity,
                signature,
            };
            PeerRecord::write_file(&peer_record, &signed)
                .await
                .with_context(|| format!("writing peer record {}", peer_record.display()))?;

            let reply = MeshClient::new(registrar).register(&signed).await?;
            println!("{}: {}", reply.outcome, reply.message);
            if let Some(admission) = reply.admission {
                println!(
                    "peers {} -> {} after {} connectivity and {} convergence polls ({})",
                    admission.initial_peers,
                    admission.observed_peers,
                    admission.peer_attempts,
                    admission.convergence_attempts,
                    meshgate_utils::format_millis(admission.elapsed_ms),
                );
            }
        }

        ClientAction::Access {
            action,
            registrar,
            peer_record,
            signature,
            node_id,
        } => {
            let stored = PeerRecord::new(&peer_record).current().await?;
            let (signature, node_id) = match (signature, node_id, stored) {
                (Some(signature), Some(node_id), _) => (signature, node_id),
                (signature, node_id, Some(stored)) => (
                    signature.unwrap_or(stored.signature),
                    node_id.unwrap_or(stored.identity.node_id),
                ),
                _ => {
                    return Err(anyhow!(
                        "no peer record at {}; pass --signature and --node-id",
                        peer_record.display()
                    ))
                }
            };

            let reply = MeshClient::new(registrar)
                .access(action, &signature, &node_id)
                .await?;
            println!("{}", reply.message);
            println!(
                "flow {} permits {:?} (token {:?})",
                reply.flow, reply.permissions, reply.token
            );
            if !reply.is_allowed() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let base = NodeConfig::from_toml_str(
            r#"
            port = 6000
            node_type = "fog"
            enable_metrics = true
            "#,
        )
        .unwrap();
        let args = RunArgs {
            port: Some(7000),
            log_level: Some("debug".into()),
            ..RunArgs::default()
        };

        let config = args.apply(base);
        assert_eq!(config.port, 7000);
        assert_eq!(config.node_type, NodeType::Fog);
        assert!(config.enable_metrics);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn parses_client_access() {
        let cli = Cli::try_parse_from([
            "meshgate",
            "client",
            "access",
            "execute",
            "--registrar",
            "http://10.0.0.1:5000",
            "--node-id",
            "N-3",
        ])
        .unwrap();
        match cli.command {
            Command::Client {
                action: ClientAction::Access { action, node_id, signature, .. },
            } => {
                assert_eq!(action, Action::Execute);
                assert_eq!(node_id.as_deref(), Some("N-3"));
                assert!(signature.is_none());
            }
            _ => panic!("expected client access"),
        }
    }

    #[test]
    fn rejects_unknown_node_type() {
        let result = Cli::try_parse_from(["meshgate", "node", "run", "--node-type", "satellite"]);
        assert!(result.is_err());
    }
}
