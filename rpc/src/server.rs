//! Axum-based HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Router;
use meshgate_admission::RegistrationCoordinator;
use meshgate_capability::PolicyEnforcementPoint;
use meshgate_store::{BootstrapState, NodeRegistry};
use meshgate_types::Action;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{self, AccessQuery};
use crate::{NodeMetrics, RpcError};

/// Everything the handlers need, cloned into each request.
#[derive(Clone)]
pub struct RpcState {
    pub coordinator: Arc<RegistrationCoordinator>,
    pub pep: PolicyEnforcementPoint,
    pub registry: NodeRegistry,
    pub bootstrap: BootstrapState,
    pub metrics: Arc<NodeMetrics>,
    /// Parent of every per-request cancellation token.
    pub shutdown: CancellationToken,
}

/// Build the router. `/metrics` is only mounted when `expose_metrics` is set.
pub fn router(state: RpcState, expose_metrics: bool) -> Router {
    let mut app = Router::new()
        .route("/register-node", post(handlers::register_node))
        .route("/acknowledgement", post(handlers::acknowledgement))
        .route("/get-nodes", get(handlers::get_nodes))
        .route("/health", get(handlers::health));

    for action in Action::ALL {
        let handler = move |State(state): State<RpcState>, Query(query): Query<AccessQuery>| {
            handlers::perform_action(state, query, action)
        };
        let method = match action {
            Action::Read => get(handler),
            _ => post(handler),
        };
        app = app.route(handlers::action_path(action), method);
    }

    if expose_metrics {
        app = app.route("/metrics", get(handlers::metrics));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

pub struct RpcServer {
    pub addr: SocketAddr,
    pub expose_metrics: bool,
    state: RpcState,
}

impl RpcServer {
    pub fn new(addr: SocketAddr, state: RpcState, expose_metrics: bool) -> Self {
        Self {
            addr,
            expose_metrics,
            state,
        }
    }

    /// Bind and serve until `shutdown` fires, then drain in-flight requests.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), RpcError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| RpcError::Server(format!("failed to bind {}: {e}", self.addr)))?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), RpcError> {
        let local = listener.local_addr().unwrap_or(self.addr);
        info!(addr = %local, "HTTP server listening");

        let app = router(self.state, self.expose_metrics);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
