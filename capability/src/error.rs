use meshgate_ledger::LedgerError;
use meshgate_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("malformed capability policy: {raw:?}")]
    PolicyParse { raw: String },

    #[error("ledger holds no token for the pair after issuance")]
    TokenMissing,

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("requester {node_id} is not registered")]
    RequesterNotRegistered { node_id: String },

    #[error("interaction partner is not registered on this node")]
    PartnerUnknown,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CapabilityError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CapabilityError::PolicyParse { .. } => "invalid_policy",
            CapabilityError::TokenMissing | CapabilityError::Ledger(_) => "ledger_error",
            CapabilityError::Unavailable(_) => "ledger_unavailable",
            CapabilityError::RequesterNotRegistered { .. } => "not_registered",
            CapabilityError::PartnerUnknown => "partner_unknown",
            CapabilityError::Store(_) => "store_error",
        }
    }
}
