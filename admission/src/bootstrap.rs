//! Delivery of the bootstrap acknowledgement to a newly registered node.

use std::sync::Mutex;

use async_trait::async_trait;
use meshgate_types::NodeIdentity;

use crate::AdmissionError;

/// Pushes the ledger snapshot (genesis, registry contract, prefunded
/// accounts, contact descriptor) to a registered node's callback URL.
#[async_trait]
pub trait BootstrapDispatcher: Send + Sync {
    async fn dispatch(&self, target: &NodeIdentity) -> Result<(), AdmissionError>;
}

/// Dispatcher that records targets instead of sending anything.
///
/// Used by nodes running without a ledger snapshot to share and by tests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<NodeIdentity>>,
    failure: Mutex<Option<String>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent dispatches fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason.into());
    }

    pub fn sent(&self) -> Vec<NodeIdentity> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl BootstrapDispatcher for RecordingDispatcher {
    async fn dispatch(&self, target: &NodeIdentity) -> Result<(), AdmissionError> {
        if let Some(reason) = self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(AdmissionError::Bootstrap(reason));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(target.clone());
        Ok(())
    }
}
