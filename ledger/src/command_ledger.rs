//! [`LedgerClient`] implemented over a [`CommandTransport`].

use async_trait::async_trait;
use meshgate_types::{CapabilityToken, NodeAddress, Signature, Timestamp};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::reply::{parse_bool, parse_count, parse_json, FlexibleU64};
use crate::{
    CommandTransport, LedgerClient, LedgerCommand, LedgerError, ProcessTransport, Receipt,
    RegisterOutcome, RegisteredNode, Registration, ValidatorSet,
};

/// Reply marker the ledger uses for a signature it already holds.
const ALREADY_REGISTERED: &str = "already registered";

/// Ledger client that maps every trait call onto one ledger command.
pub struct CommandLedger<T = ProcessTransport> {
    transport: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenReply {
    #[serde(default)]
    policy: Option<String>,
    #[serde(default)]
    issued_at: Option<FlexibleU64>,
    #[serde(default)]
    is_issued: bool,
    #[serde(default)]
    is_revoked: bool,
}

impl<T: CommandTransport> CommandLedger<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn call(&self, command: LedgerCommand) -> Result<String, LedgerError> {
        self.transport.call(&command).await
    }

    async fn call_bool(&self, command: LedgerCommand) -> Result<bool, LedgerError> {
        let call = command.name();
        let reply = self.call(command).await?;
        parse_bool(call, &reply)
    }

    async fn call_receipt(&self, command: LedgerCommand) -> Result<Receipt, LedgerError> {
        self.call(command).await.map(Receipt)
    }

    fn parse_addresses(call: &'static str, raw: &str) -> Result<Vec<NodeAddress>, LedgerError> {
        let entries: Vec<String> = parse_json(call, raw)?;
        entries
            .iter()
            .map(|entry| {
                NodeAddress::parse(entry).map_err(|_| LedgerError::External {
                    call,
                    raw: raw.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl<T: CommandTransport> LedgerClient for CommandLedger<T> {
    async fn check_contract_deployed(&self) -> Result<bool, LedgerError> {
        self.call_bool(LedgerCommand::CheckIfDeployed).await
    }

    async fn is_registered(&self, signature: &Signature) -> Result<bool, LedgerError> {
        self.call_bool(LedgerCommand::IsNodeRegistered {
            signature: signature.clone(),
        })
        .await
    }

    async fn get_details(&self, signature: &Signature) -> Result<Option<RegisteredNode>, LedgerError> {
        let command = LedgerCommand::GetNodeDetails {
            signature: signature.clone(),
        };
        let call = command.name();
        let reply = self.call(command).await?;
        let value: serde_json::Value = parse_json(call, &reply)?;
        if value.get("error").is_some() {
            debug!(signature = %signature.short(), "ledger has no record for signature");
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|_| LedgerError::External { call, raw: reply })
    }

    async fn register_node(&self, registration: &Registration) -> Result<RegisterOutcome, LedgerError> {
        let command = LedgerCommand::RegisterNode(Box::new(registration.clone()));
        match self.call(command).await {
            Ok(reply) if reply.to_ascii_lowercase().contains(ALREADY_REGISTERED) => {
                Ok(RegisterOutcome::AlreadyRegistered)
            }
            Ok(reply) => Ok(RegisterOutcome::Registered {
                receipt: Receipt(reply),
            }),
            Err(LedgerError::NonZeroExit { stderr, stdout, .. }) => {
                let detail = if stderr.is_empty() { stdout } else { stderr };
                if detail.to_ascii_lowercase().contains(ALREADY_REGISTERED) {
                    return Ok(RegisterOutcome::AlreadyRegistered);
                }
                warn!(node_id = %registration.identity.node_id, %detail, "ledger refused registration");
                Ok(RegisterOutcome::Failed { detail })
            }
            Err(e) => Err(e),
        }
    }

    async fn is_validator(&self, signature: &Signature) -> Result<bool, LedgerError> {
        self.call_bool(LedgerCommand::IsValidator {
            signature: signature.clone(),
        })
        .await
    }

    async fn validator_set(&self) -> Result<ValidatorSet, LedgerError> {
        let command = LedgerCommand::GetValidators;
        let call = command.name();
        let reply = self.call(command).await?;
        Ok(Self::parse_addresses(call, &reply)?.into_iter().collect())
    }

    async fn peer_count(&self) -> Result<u64, LedgerError> {
        let command = LedgerCommand::GetPeerCount;
        let call = command.name();
        let reply = self.call(command).await?;
        parse_count(call, &reply)
    }

    async fn propose_validator_vote(
        &self,
        address: &NodeAddress,
        add: bool,
    ) -> Result<Receipt, LedgerError> {
        self.call_receipt(LedgerCommand::ProposeValidatorVote {
            address: address.clone(),
            add,
        })
        .await
    }

    async fn emit_validator_proposal(&self, address: &NodeAddress) -> Result<Receipt, LedgerError> {
        self.call_receipt(LedgerCommand::EmitValidatorProposal {
            address: address.clone(),
        })
        .await
    }

    async fn observed_proposals(&self) -> Result<Vec<NodeAddress>, LedgerError> {
        let command = LedgerCommand::ListenForValidatorProposals;
        let call = command.name();
        let reply = self.call(command).await?;
        Self::parse_addresses(call, &reply)
    }

    async fn issue_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<CapabilityToken, LedgerError> {
        let command = LedgerCommand::IssueCapabilityToken {
            from: from.clone(),
            to: to.clone(),
        };
        let call = command.name();
        let receipt = self.call(command).await?;
        // The issuing call only acknowledges; read back what the ledger stored.
        self.get_capability_token(from, to)
            .await?
            .ok_or(LedgerError::External { call, raw: receipt })
    }

    async fn revoke_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<Receipt, LedgerError> {
        self.call_receipt(LedgerCommand::RevokeCapabilityToken {
            from: from.clone(),
            to: to.clone(),
        })
        .await
    }

    async fn get_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<Option<CapabilityToken>, LedgerError> {
        let command = LedgerCommand::GetCapabilityToken {
            from: from.clone(),
            to: to.clone(),
        };
        let call = command.name();
        let reply = self.call(command).await?;
        let token: TokenReply = parse_json(call, &reply)?;
        let issued_at = match &token.issued_at {
            Some(raw) => raw.value().ok_or_else(|| LedgerError::External {
                call,
                raw: reply.clone(),
            })?,
            None => 0,
        };
        if !token.is_issued && !token.is_revoked && issued_at == 0 {
            return Ok(None);
        }
        Ok(Some(CapabilityToken {
            from: from.clone(),
            to: to.clone(),
            policy: token.policy.filter(|p| !p.trim().is_empty()),
            issued_at: Timestamp::new(issued_at),
            is_issued: token.is_issued,
            is_revoked: token.is_revoked,
        }))
    }

    async fn check_token_expiry(
        &self,
        from: &Signature,
        to: &Signature,
        validity_secs: u64,
    ) -> Result<bool, LedgerError> {
        self.call_bool(LedgerCommand::CheckTokenExpiry {
            from: from.clone(),
            to: to.clone(),
            validity_secs,
        })
        .await
    }

    async fn check_token_availability(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<bool, LedgerError> {
        self.call_bool(LedgerCommand::CheckCapabilityToken {
            from: from.clone(),
            to: to.clone(),
        })
        .await
    }
}
