//! Ledger command wire format: a call name plus positional string arguments.

use meshgate_types::{NodeAddress, Signature};

use crate::Registration;

/// One call against the ledger's command script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCommand {
    CheckIfDeployed,
    IsNodeRegistered { signature: Signature },
    GetNodeDetails { signature: Signature },
    RegisterNode(Box<Registration>),
    IsValidator { signature: Signature },
    GetValidators,
    GetPeerCount,
    ProposeValidatorVote { address: NodeAddress, add: bool },
    EmitValidatorProposal { address: NodeAddress },
    ListenForValidatorProposals,
    IssueCapabilityToken { from: Signature, to: Signature },
    RevokeCapabilityToken { from: Signature, to: Signature },
    GetCapabilityToken { from: Signature, to: Signature },
    CheckTokenExpiry {
        from: Signature,
        to: Signature,
        validity_secs: u64,
    },
    CheckCapabilityToken { from: Signature, to: Signature },
}

impl LedgerCommand {
    /// Call name understood by the ledger script.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::CheckIfDeployed => "checkIfDeployed",
            LedgerCommand::IsNodeRegistered { .. } => "isNodeRegistered",
            LedgerCommand::GetNodeDetails { .. } => "getNodeDetails",
            LedgerCommand::RegisterNode(_) => "registerNode",
            LedgerCommand::IsValidator { .. } => "isValidator",
            LedgerCommand::GetValidators => "getValidatorsByBlockNumber",
            LedgerCommand::GetPeerCount => "getPeerCount",
            LedgerCommand::ProposeValidatorVote { .. } => "proposeValidatorVote",
            LedgerCommand::EmitValidatorProposal { .. } => "emitValidatorProposalToChain",
            LedgerCommand::ListenForValidatorProposals => "listenForValidatorProposals",
            LedgerCommand::IssueCapabilityToken { .. } => "issueCapabilityToken",
            LedgerCommand::RevokeCapabilityToken { .. } => "revokeCapabilityToken",
            LedgerCommand::GetCapabilityToken { .. } => "getCapabilityToken",
            LedgerCommand::CheckTokenExpiry { .. } => "checkTokenExpiry",
            LedgerCommand::CheckCapabilityToken { .. } => "checkCapabilityToken",
        }
    }

    /// Positional arguments following the call name.
    pub fn args(&self) -> Vec<String> {
        match self {
            LedgerCommand::CheckIfDeployed
            | LedgerCommand::GetValidators
            | LedgerCommand::GetPeerCount
            | LedgerCommand::ListenForValidatorProposals => Vec::new(),
            LedgerCommand::IsNodeRegistered { signature }
            | LedgerCommand::GetNodeDetails { signature }
            | LedgerCommand::IsValidator { signature } => vec![signature.to_hex()],
            LedgerCommand::RegisterNode(reg) => {
                let id = &reg.identity;
                vec![
                    id.node_id.clone(),
                    id.node_name.clone(),
                    id.node_type.as_str().to_string(),
                    id.public_key.to_hex(),
                    id.address.to_string(),
                    id.rpc_url.clone().unwrap_or_default(),
                    reg.admitting_node_type.as_str().to_string(),
                    reg.signature.to_hex(),
                    reg.admitted_by
                        .as_ref()
                        .map(Signature::to_hex)
                        .unwrap_or_default(),
                ]
            }
            LedgerCommand::ProposeValidatorVote { address, add } => {
                vec![address.to_string(), add.to_string()]
            }
            LedgerCommand::EmitValidatorProposal { address } => vec![address.to_string()],
            LedgerCommand::IssueCapabilityToken { from, to }
            | LedgerCommand::RevokeCapabilityToken { from, to }
            | LedgerCommand::GetCapabilityToken { from, to }
            | LedgerCommand::CheckCapabilityToken { from, to } => {
                vec![from.to_hex(), to.to_hex()]
            }
            LedgerCommand::CheckTokenExpiry {
                from,
                to,
                validity_secs,
            } => vec![from.to_hex(), to.to_hex(), validity_secs.to_string()],
        }
    }
}
