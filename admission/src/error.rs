use std::time::Duration;

use meshgate_ledger::LedgerError;
use meshgate_store::StoreError;
use meshgate_types::NodeAddress;
use thiserror::Error;

use crate::Stage;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("signature verification failed for node {node_id}")]
    InvalidSignature { node_id: String },

    #[error("node {node_id} is already registered")]
    Duplicate { node_id: String },

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("ledger rejected registration: {detail}")]
    ChainRejected { detail: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bootstrap acknowledgement failed: {0}")]
    Bootstrap(String),

    #[error("{stage} did not converge within {waited:?}")]
    ConvergenceTimeout { stage: Stage, waited: Duration },

    #[error("{stage} wait cancelled")]
    Cancelled { stage: Stage },

    #[error("admission of {candidate} is already in progress")]
    AlreadyPending { candidate: NodeAddress },
}

impl AdmissionError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionError::MissingField(_) | AdmissionError::InvalidField { .. } => "invalid_request",
            AdmissionError::InvalidSignature { .. } => "invalid_signature",
            AdmissionError::Duplicate { .. } => "duplicate",
            AdmissionError::LedgerUnavailable(_) => "ledger_unavailable",
            AdmissionError::ChainRejected { .. } | AdmissionError::Ledger(_) => "ledger_error",
            AdmissionError::Store(_) => "store_error",
            AdmissionError::Bootstrap(_) => "bootstrap_failed",
            AdmissionError::ConvergenceTimeout { .. } => "timeout",
            AdmissionError::Cancelled { .. } => "cancelled",
            AdmissionError::AlreadyPending { .. } => "already_pending",
        }
    }
}
