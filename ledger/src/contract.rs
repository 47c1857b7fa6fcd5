//! Two-stage check that the node registry contract is usable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::{LedgerClient, LedgerError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractStatus {
    Deployed,
    /// The local contract artifact is missing; nothing was asked of the ledger.
    ArtifactMissing(PathBuf),
    /// The artifact exists but the ledger reports no code at the contract address.
    NotDeployed,
}

impl ContractStatus {
    pub fn is_deployed(&self) -> bool {
        matches!(self, ContractStatus::Deployed)
    }

    /// Operator-facing reason when the contract is unusable.
    pub fn reason(&self) -> Option<String> {
        match self {
            ContractStatus::Deployed => None,
            ContractStatus::ArtifactMissing(path) => {
                Some(format!("contract artifact {} not found", path.display()))
            }
            ContractStatus::NotDeployed => Some("node registry contract is not deployed".into()),
        }
    }
}

/// Checks the local contract artifact, then asks the ledger.
#[derive(Clone)]
pub struct ContractProbe {
    artifact: PathBuf,
    ledger: Arc<dyn LedgerClient>,
}

impl ContractProbe {
    pub fn new(artifact: impl Into<PathBuf>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            artifact: artifact.into(),
            ledger,
        }
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub async fn status(&self) -> Result<ContractStatus, LedgerError> {
        if !tokio::fs::try_exists(&self.artifact).await.unwrap_or(false) {
            warn!(path = %self.artifact.display(), "contract artifact missing");
            return Ok(ContractStatus::ArtifactMissing(self.artifact.clone()));
        }
        if self.ledger.check_contract_deployed().await? {
            Ok(ContractStatus::Deployed)
        } else {
            warn!("ledger reports node registry contract not deployed");
            Ok(ContractStatus::NotDeployed)
        }
    }
}
