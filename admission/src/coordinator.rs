//! Registration state machine for nodes joining through this node.
//!
//! ```text
//! Received ─ fields present? ──no──> MissingField / InvalidField
//!    │ contract deployed? ──no──> LedgerUnavailable
//!    │ signature valid? ────no──> InvalidSignature
//!    │ already registered? ─yes─> Duplicate
//!    │ registerNode ──failed────> ChainRejected
//!    ▼
//! Registered ─ address already a validator? ──yes──> AlreadyValidator
//!    │ bootstrap acknowledgement ──failed──> Bootstrap
//!    │ validator-flagged? ──no──> NonValidator
//!    ▼
//! ValidatorAdmitted (after the admission wait)
//! ```

use std::sync::Arc;

use meshgate_crypto::IdentityClaim;
use meshgate_ledger::{ContractProbe, LedgerClient, RegisterOutcome, Registration};
use meshgate_store::{PeerRecord, RegistryEntry, RegistryWriter};
use meshgate_types::{NodeAddress, NodeIdentity, NodeType, PublicKey, Signature};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{AdmissionError, AdmissionReport, BootstrapDispatcher, ValidatorAdmissionController};

/// A registration request as received. Every field is optional here so that
/// missing ones are reported by name rather than as a body parse failure.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RegistrationRequest {
    pub node_id: Option<String>,
    pub node_name: Option<String>,
    pub node_type: Option<String>,
    pub public_key: Option<String>,
    pub address: Option<String>,
    #[serde(alias = "node_url")]
    pub callback_url: Option<String>,
    pub rpc_url: Option<String>,
    pub signature: Option<String>,
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, AdmissionError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AdmissionError::MissingField(field)),
    }
}

/// Required fields borrowed out of a request, checked for presence.
struct Fields<'a> {
    claim: IdentityClaim<'a>,
    address: NodeAddress,
    callback_url: &'a str,
}

impl RegistrationRequest {
    /// Node id for logs, if the request carried one.
    pub fn node_id(&self) -> &str {
        self.node_id.as_deref().unwrap_or("<unknown>")
    }

    fn fields(&self) -> Result<Fields<'_>, AdmissionError> {
        let claim = IdentityClaim {
            node_id: required("node_id", &self.node_id)?,
            node_name: required("node_name", &self.node_name)?,
            node_type: required("node_type", &self.node_type)?,
            public_key: required("public_key", &self.public_key)?,
            signature: required("signature", &self.signature)?,
        };
        let address = NodeAddress::parse(required("address", &self.address)?).map_err(|e| {
            AdmissionError::InvalidField {
                field: "address",
                reason: e.to_string(),
            }
        })?;
        let callback_url = required("callback_url", &self.callback_url)?;
        Ok(Fields {
            claim,
            address,
            callback_url,
        })
    }
}

impl Fields<'_> {
    /// Typed identity; only called once the claim has verified, so every
    /// decode is known to succeed.
    fn into_signed(self, rpc_url: Option<String>) -> Result<(NodeIdentity, Signature), AdmissionError> {
        let invalid = || AdmissionError::InvalidSignature {
            node_id: self.claim.node_id.to_string(),
        };
        let node_type: NodeType = self.claim.node_type.parse().map_err(|_| invalid())?;
        let public_key = PublicKey::from_hex(self.claim.public_key).map_err(|_| invalid())?;
        let signature = Signature::from_hex(self.claim.signature).map_err(|_| invalid())?;
        let identity = NodeIdentity {
            node_id: self.claim.node_id.to_string(),
            node_name: self.claim.node_name.to_string(),
            node_type,
            public_key,
            address: self.address,
            callback_url: self.callback_url.to_string(),
            rpc_url: rpc_url.filter(|u| !u.trim().is_empty()),
        };
        Ok((identity, signature))
    }
}

/// Terminal success states of a registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The node's address was already in the validator set (genesis validator).
    AlreadyValidator { node_id: String, address: NodeAddress },
    NonValidator { node_id: String, address: NodeAddress },
    ValidatorAdmitted { node_id: String, report: AdmissionReport },
}

impl RegistrationOutcome {
    /// Machine-readable outcome label.
    pub fn label(&self) -> &'static str {
        match self {
            RegistrationOutcome::AlreadyValidator { .. } => "already_validator",
            RegistrationOutcome::NonValidator { .. } => "non_validator",
            RegistrationOutcome::ValidatorAdmitted { .. } => "consensus_reached",
        }
    }

    pub fn message(&self) -> String {
        match self {
            RegistrationOutcome::AlreadyValidator { address, .. } => {
                format!("Node {address} is already registered as a validator.")
            }
            RegistrationOutcome::NonValidator { address, .. } => {
                format!("Registration successful: node {address} is not a validator.")
            }
            RegistrationOutcome::ValidatorAdmitted { report, .. } => format!(
                "All validators agreed: validator {} is added to the ledger.",
                report.candidate
            ),
        }
    }
}

/// Drives a registration request to a terminal state.
///
/// Holds the only [`RegistryWriter`], so the local registry changes only
/// through here.
pub struct RegistrationCoordinator {
    ledger: Arc<dyn LedgerClient>,
    contract: ContractProbe,
    registry: RegistryWriter,
    dispatcher: Arc<dyn BootstrapDispatcher>,
    admission: ValidatorAdmissionController,
    local_node_type: NodeType,
    local_peer: PeerRecord,
}

impl RegistrationCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        contract: ContractProbe,
        registry: RegistryWriter,
        dispatcher: Arc<dyn BootstrapDispatcher>,
        admission: ValidatorAdmissionController,
        local_node_type: NodeType,
        local_peer: PeerRecord,
    ) -> Self {
        Self {
            ledger,
            contract,
            registry,
            dispatcher,
            admission,
            local_node_type,
            local_peer,
        }
    }

    pub fn admission(&self) -> &ValidatorAdmissionController {
        &self.admission
    }

    /// Process one registration. `cancel` bounds the admission wait to the
    /// lifetime of the triggering request.
    pub async fn register(
        &self,
        request: RegistrationRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationOutcome, AdmissionError> {
        let fields = request.fields()?;

        let status = self.contract.status().await?;
        if let Some(reason) = status.reason() {
            return Err(AdmissionError::LedgerUnavailable(reason));
        }

        if !fields.claim.verify() {
            warn!(node_id = fields.claim.node_id, "registration rejected: bad signature");
            return Err(AdmissionError::InvalidSignature {
                node_id: fields.claim.node_id.to_string(),
            });
        }
        let (identity, signature) = fields.into_signed(request.rpc_url.clone())?;
        let node_id = identity.node_id.clone();

        if self.ledger.is_registered(&signature).await? {
            info!(%node_id, "registration rejected: already registered");
            return Err(AdmissionError::Duplicate { node_id });
        }

        let admitted_by = match self.local_peer.current().await {
            Ok(peer) => peer.map(|p| p.signature),
            Err(e) => {
                warn!(error = %e, "local peer record unreadable; registering without it");
                None
            }
        };
        let registration = Registration {
            identity: identity.clone(),
            signature,
            admitting_node_type: self.local_node_type,
            admitted_by,
        };
        match self.ledger.register_node(&registration).await? {
            RegisterOutcome::Registered { receipt } => {
                info!(%node_id, node_type = %identity.node_type, receipt = %receipt.0, "node registered on ledger");
            }
            RegisterOutcome::AlreadyRegistered => {
                return Err(AdmissionError::Duplicate { node_id });
            }
            RegisterOutcome::Failed { detail } => {
                return Err(AdmissionError::ChainRejected { detail });
            }
        }

        self.registry.record(RegistryEntry::from(&identity)).await?;

        let address = identity.address.clone();
        if self.ledger.validator_set().await?.contains(&address) {
            info!(%node_id, %address, "registered node is already a validator");
            return Ok(RegistrationOutcome::AlreadyValidator { node_id, address });
        }

        if let Err(e) = self.dispatcher.dispatch(&identity).await {
            warn!(%node_id, error = %e, "bootstrap acknowledgement failed; node stays registered");
            return Err(e);
        }
        info!(%node_id, callback = %identity.callback_url, "bootstrap acknowledgement sent");

        if !self.ledger.is_validator(&registration.signature).await? {
            return Ok(RegistrationOutcome::NonValidator { node_id, address });
        }

        info!(%node_id, %address, "validator-flagged node; starting admission");
        let report = self.admission.admit(&address, cancel).await?;
        Ok(RegistrationOutcome::ValidatorAdmitted { node_id, report })
    }
}
