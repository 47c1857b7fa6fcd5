//! The policy enforcement point shared by every action endpoint.

use std::sync::Arc;

use meshgate_ledger::{ContractProbe, LedgerClient};
use meshgate_store::PeerRecord;
use meshgate_types::{Action, Signature};
use serde::Serialize;
use tracing::{info, warn};

use crate::{Authorization, CapabilityError, TokenManager};

/// Outcome of an enforcement check that reached a decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Enforcement {
    pub requester_id: String,
    pub partner_id: String,
    #[serde(flatten)]
    pub authorization: Authorization,
}

#[derive(Clone)]
pub struct PolicyEnforcementPoint {
    ledger: Arc<dyn LedgerClient>,
    contract: ContractProbe,
    tokens: TokenManager,
    partner: PeerRecord,
}

impl PolicyEnforcementPoint {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        contract: ContractProbe,
        tokens: TokenManager,
        partner: PeerRecord,
    ) -> Self {
        Self {
            ledger,
            contract,
            tokens,
            partner,
        }
    }

    /// Check whether the requester may perform `action` against this node.
    ///
    /// The partner is always this node's own stored peer record. A `Denied`
    /// decision is a successful check; only failures to decide are errors.
    pub async fn enforce(
        &self,
        requester: &Signature,
        requester_id: &str,
        action: Action,
    ) -> Result<Enforcement, CapabilityError> {
        let status = self.contract.status().await?;
        if let Some(reason) = status.reason() {
            return Err(CapabilityError::Unavailable(reason));
        }

        if !self.ledger.is_registered(requester).await? {
            warn!(requester_id, %action, "action requested by unregistered node");
            return Err(CapabilityError::RequesterNotRegistered {
                node_id: requester_id.to_string(),
            });
        }

        let partner = self
            .partner
            .current()
            .await?
            .ok_or(CapabilityError::PartnerUnknown)?;

        let authorization = self
            .tokens
            .authorize(requester, &partner.signature, action)
            .await?;
        info!(
            requester_id,
            partner_id = %partner.identity.node_id,
            %action,
            decision = ?authorization.decision,
            "action authorization"
        );
        Ok(Enforcement {
            requester_id: requester_id.to_string(),
            partner_id: partner.identity.node_id,
            authorization,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decision;
    use meshgate_ledger::Registration;
    use meshgate_nullables::NullLedger;
    use meshgate_types::{NodeAddress, NodeIdentity, NodeType, PublicKey, SignedIdentity};

    struct Fixture {
        ledger: Arc<NullLedger>,
        pep: PolicyEnforcementPoint,
        _dir: tempfile::TempDir,
    }

    fn identity(id: &str, b: u8) -> SignedIdentity {
        SignedIdentity {
            identity: NodeIdentity {
                node_id: id.into(),
                node_name: id.to_lowercase(),
                node_type: NodeType::Fog,
                public_key: PublicKey([b; 32]),
                address: NodeAddress::from_bytes(&[b; 20]),
                callback_url: "http://127.0.0.1:5000".into(),
                rpc_url: None,
            },
            signature: Signature([b; 64]),
        }
    }

    async fn register(ledger: &NullLedger, node: &SignedIdentity) {
        ledger
            .register_node(&Registration {
                identity: node.identity.clone(),
                signature: node.signature.clone(),
                admitting_node_type: NodeType::Cloud,
                admitted_by: None,
            })
            .await
            .unwrap();
    }

    fn fixture(with_partner: bool, with_artifact: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("NodeRegistry.json");
        if with_artifact {
            std::fs::write(&artifact, b"{}").unwrap();
        }
        let ledger = Arc::new(NullLedger::new());
        let partner = if with_partner {
            PeerRecord::fixed(dir.path().join("node-details.json"), identity("A", 0xa))
        } else {
            PeerRecord::new(dir.path().join("node-details.json"))
        };
        let pep = PolicyEnforcementPoint::new(
            ledger.clone(),
            ContractProbe::new(artifact, ledger.clone()),
            TokenManager::new(ledger.clone(), 360_000),
            partner,
        );
        Fixture {
            ledger,
            pep,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn registered_requester_is_authorized_against_partner() {
        let f = fixture(true, true);
        let requester = identity("C", 0xc);
        register(&f.ledger, &requester).await;

        let out = f
            .pep
            .enforce(&requester.signature, "C", Action::Read)
            .await
            .unwrap();
        assert_eq!(out.partner_id, "A");
        assert_eq!(out.authorization.decision, Decision::Allowed);
        assert!(f.ledger.token(&requester.signature, &Signature([0xa; 64])).is_some());

        let out = f
            .pep
            .enforce(&requester.signature, "C", Action::Execute)
            .await
            .unwrap();
        assert_eq!(out.authorization.decision, Decision::Denied);
    }

    #[tokio::test]
    async fn unregistered_requester_is_rejected_before_token_work() {
        let f = fixture(true, true);
        let err = f
            .pep
            .enforce(&Signature([0xc; 64]), "C", Action::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::RequesterNotRegistered { node_id } if node_id == "C"));
        assert_eq!(f.ledger.call_count("checkCapabilityToken"), 0);
    }

    #[tokio::test]
    async fn missing_partner_record() {
        let f = fixture(false, true);
        let requester = identity("C", 0xc);
        register(&f.ledger, &requester).await;
        let err = f
            .pep
            .enforce(&requester.signature, "C", Action::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::PartnerUnknown));
    }

    #[tokio::test]
    async fn contract_checks_gate_everything() {
        let f = fixture(true, false);
        let err = f
            .pep
            .enforce(&Signature([0xc; 64]), "C", Action::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
        assert_eq!(f.ledger.call_count("checkIfDeployed"), 0);

        let f = fixture(true, true);
        f.ledger.set_deployed(false);
        let err = f
            .pep
            .enforce(&Signature([0xc; 64]), "C", Action::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
        assert_eq!(f.ledger.call_count("isNodeRegistered"), 0);
    }
}
