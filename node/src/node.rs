//! The main meshgate node struct: wires the ledger, admission and capability
//! components together and drives the process lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use meshgate_admission::{
    BootstrapDispatcher, ListenerExit, ProposalListener, RegistrationCoordinator,
    ValidatorAdmissionController,
};
use meshgate_capability::{PolicyEnforcementPoint, TokenManager};
use meshgate_ledger::{CommandLedger, ContractProbe, LedgerClient, ProcessTransport};
use meshgate_rpc::{RpcServer, RpcState};
use meshgate_store::{BootstrapState, NodeRegistry, PeerRecord};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::bootstrap::HttpBootstrapDispatcher;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::shutdown::ShutdownController;
use crate::NodeMetrics;

pub struct MeshNode {
    config: NodeConfig,
    ledger: Arc<dyn LedgerClient>,
    peer: PeerRecord,
    state: RpcState,
    metrics: Arc<NodeMetrics>,
    shutdown: Arc<ShutdownController>,
}

impl MeshNode {
    /// Build a node talking to the ledger through its command script and
    /// delivering bootstrap acknowledgements over HTTP.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let mut transport = ProcessTransport::new(
            config.ledger_program.clone(),
            config.ledger_script.clone(),
            Duration::from_secs(config.ledger_timeout_secs),
        );
        if let Some(dir) = &config.ledger_working_dir {
            transport = transport.with_working_dir(dir.clone());
        }
        let ledger: Arc<dyn LedgerClient> = Arc::new(CommandLedger::new(transport));
        let dispatcher = Arc::new(HttpBootstrapDispatcher::from_config(&config));
        Self::with_components(config, ledger, dispatcher)
    }

    /// Build a node around an existing ledger client and dispatcher.
    pub fn with_components(
        config: NodeConfig,
        ledger: Arc<dyn LedgerClient>,
        dispatcher: Arc<dyn BootstrapDispatcher>,
    ) -> Result<Self, NodeError> {
        let (registry, registry_writer) = NodeRegistry::hydrate(config.registry_path())?;
        let peer = PeerRecord::new(config.peer_record_file.clone());

        let admission = ValidatorAdmissionController::new(
            ledger.clone(),
            config.admission.peer_wait.clone(),
            config.admission.convergence_wait.clone(),
        );
        let coordinator = RegistrationCoordinator::new(
            ledger.clone(),
            ContractProbe::new(config.contract_artifact.clone(), ledger.clone()),
            registry_writer,
            dispatcher,
            admission,
            config.node_type,
            peer.clone(),
        );
        let pep = PolicyEnforcementPoint::new(
            ledger.clone(),
            ContractProbe::new(config.contract_artifact.clone(), ledger.clone()),
            TokenManager::new(ledger.clone(), config.token_validity_secs),
            peer.clone(),
        );

        let metrics = Arc::new(NodeMetrics::new());
        let shutdown = Arc::new(ShutdownController::new());
        let state = RpcState {
            coordinator: Arc::new(coordinator),
            pep,
            registry,
            bootstrap: BootstrapState::new(config.bootstrap_dir()),
            metrics: metrics.clone(),
            shutdown: shutdown.token(),
        };

        Ok(Self {
            config,
            ledger,
            peer,
            state,
            metrics,
            shutdown,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<NodeMetrics> {
        self.metrics.clone()
    }

    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.state.registry
    }

    /// The HTTP surface of this node, without binding it.
    pub fn router(&self) -> Router {
        meshgate_rpc::router(self.state.clone(), self.config.enable_metrics)
    }

    /// Spawn the proposal listener.
    ///
    /// The listener keeps ticking while this node has no peer record or is
    /// not a validator, so a node that registers itself after startup starts
    /// voting once the ledger flags it.
    pub fn start_listener(&self) -> JoinHandle<ListenerExit> {
        let votes = self.metrics.listener_votes.clone();
        let listener = ProposalListener::new(
            self.ledger.clone(),
            self.peer.clone(),
            Duration::from_secs(self.config.listener_interval_secs),
        )
        .on_vote(move |_| votes.inc());

        let cancel = self.shutdown.child_token();
        tokio::spawn(listener.run(cancel))
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(self) -> Result<(), NodeError> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NodeError::Config(format!("failed to bind {addr}: {e}")))?;
        self.run_with_listener(listener).await
    }

    /// Run on an already bound listener until SIGINT/SIGTERM or a
    /// programmatic shutdown, then stop the background tasks.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), NodeError> {
        let registered = self.state.registry.len().await;
        tracing::info!(
            node_type = %self.config.node_type,
            data_dir = %self.config.data_dir.display(),
            registered,
            "meshgate node starting"
        );

        let addr = self.config.listen_addr()?;
        let listener_task = self.start_listener();

        let signals = {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move { shutdown.wait_for_signal().await })
        };

        let server = RpcServer::new(addr, self.state.clone(), self.config.enable_metrics);
        let served = server
            .serve_with_listener(listener, self.shutdown.token())
            .await;

        // The server may also stop on its own error.
        self.shutdown.shutdown();
        match listener_task.await {
            Ok(exit) => tracing::info!(?exit, "proposal listener stopped"),
            Err(e) => tracing::warn!(error = %e, "proposal listener task failed"),
        }
        if let Err(e) = signals.await {
            tracing::warn!(error = %e, "signal task failed");
        }

        tracing::info!("meshgate node stopped");
        served.map_err(NodeError::from)
    }
}
