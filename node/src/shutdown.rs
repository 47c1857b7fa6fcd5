//! Graceful shutdown controller for a meshgate node.
//!
//! Listens for SIGINT/SIGTERM and cancels a root [`CancellationToken`].
//! The HTTP server, the proposal listener and every in-flight admission wait
//! hold tokens derived from it.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The root token itself.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A token cancelled on shutdown that can also be cancelled on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { info!("received SIGINT, shutting down"); }
            _ = terminate => { info!("received SIGTERM, shutting down"); }
            _ = self.token.cancelled() => { return; }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn programmatic_shutdown_cancels_children() {
        let controller = ShutdownController::new();
        let a = controller.child_token();
        let b = controller.child_token();
        controller.shutdown();
        a.cancelled().await;
        b.cancelled().await;
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn child_cancellation_does_not_propagate_up() {
        let controller = ShutdownController::new();
        let child = controller.child_token();
        child.cancel();
        assert!(!controller.is_shutdown());
    }

    #[tokio::test]
    async fn signal_wait_returns_on_programmatic_shutdown() {
        let controller = std::sync::Arc::new(ShutdownController::new());
        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.wait_for_signal().await })
        };
        controller.shutdown();
        waiter.await.unwrap();
    }
}
