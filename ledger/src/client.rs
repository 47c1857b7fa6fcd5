//! The [`LedgerClient`] trait and the values it exchanges.

use std::collections::BTreeSet;

use async_trait::async_trait;
use meshgate_types::{CapabilityToken, NodeAddress, NodeIdentity, NodeType, Signature};
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Addresses currently empowered to vote on consensus membership.
///
/// Addresses are held in canonical form, so membership checks are
/// independent of the spelling the ledger used.
pub type ValidatorSet = BTreeSet<NodeAddress>;

/// Raw acknowledgement text returned by a state-changing ledger call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt(pub String);

/// A registration as submitted to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub identity: NodeIdentity,
    pub signature: Signature,
    /// Tier of the node performing the admission.
    pub admitting_node_type: NodeType,
    /// Signature of the admitting node, when it has registered itself.
    pub admitted_by: Option<Signature>,
}

/// Result of a `registerNode` call that reached the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered { receipt: Receipt },
    AlreadyRegistered,
    /// The ledger refused the registration; `detail` is its explanation.
    Failed { detail: String },
}

/// A node record as the ledger reports it.
///
/// The ledger encodes node types either by name or by enum index, so the
/// raw field is kept and [`RegisteredNode::node_type`] interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredNode {
    pub node_id: String,
    pub node_name: String,
    #[serde(rename = "nodeType")]
    pub raw_node_type: String,
    pub public_key: String,
    #[serde(default)]
    pub is_registered: bool,
    #[serde(default)]
    pub registered_by: String,
    #[serde(default)]
    pub node_signature: String,
    #[serde(default)]
    pub registered_by_node_type: String,
}

impl RegisteredNode {
    pub fn node_type(&self) -> Option<NodeType> {
        if let Ok(idx) = self.raw_node_type.parse::<usize>() {
            return NodeType::ALL.get(idx).copied();
        }
        self.raw_node_type.parse().ok()
    }
}

/// Typed facade over the ledger's command surface.
///
/// Every call may take seconds and every call can fail; implementations
/// must report replies they cannot interpret as [`LedgerError::External`].
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Whether the node registry contract is deployed and reachable.
    async fn check_contract_deployed(&self) -> Result<bool, LedgerError>;

    async fn is_registered(&self, signature: &Signature) -> Result<bool, LedgerError>;

    /// Look up a node record; `None` when the ledger knows no such signature.
    async fn get_details(&self, signature: &Signature) -> Result<Option<RegisteredNode>, LedgerError>;

    async fn register_node(&self, registration: &Registration) -> Result<RegisterOutcome, LedgerError>;

    async fn is_validator(&self, signature: &Signature) -> Result<bool, LedgerError>;

    async fn validator_set(&self) -> Result<ValidatorSet, LedgerError>;

    async fn peer_count(&self) -> Result<u64, LedgerError>;

    /// Cast a vote to add (`add = true`) or remove a validator.
    async fn propose_validator_vote(
        &self,
        address: &NodeAddress,
        add: bool,
    ) -> Result<Receipt, LedgerError>;

    /// Publish a validator proposal event for other validators to pick up.
    async fn emit_validator_proposal(&self, address: &NodeAddress) -> Result<Receipt, LedgerError>;

    /// Addresses named by validator proposal events seen so far.
    async fn observed_proposals(&self) -> Result<Vec<NodeAddress>, LedgerError>;

    async fn issue_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<CapabilityToken, LedgerError>;

    async fn revoke_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<Receipt, LedgerError>;

    async fn get_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<Option<CapabilityToken>, LedgerError>;

    /// Whether the `(from, to)` token is older than `validity_secs`.
    async fn check_token_expiry(
        &self,
        from: &Signature,
        to: &Signature,
        validity_secs: u64,
    ) -> Result<bool, LedgerError>;

    /// Whether a live token exists for `(from, to)`.
    async fn check_token_availability(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<bool, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_node_type_by_index_or_name() {
        let mut node: RegisteredNode = serde_json::from_str(
            r#"{"nodeId":"F-1","nodeName":"fog","nodeType":"1","publicKey":"0xab","isRegistered":true}"#,
        )
        .unwrap();
        assert_eq!(node.node_type(), Some(NodeType::Fog));
        assert!(node.is_registered);
        assert_eq!(node.registered_by, "");

        node.raw_node_type = "Sensor".into();
        assert_eq!(node.node_type(), Some(NodeType::Sensor));

        node.raw_node_type = "17".into();
        assert_eq!(node.node_type(), None);
    }
}
