use std::time::Duration;

use thiserror::Error;

/// Failures talking to the ledger.
///
/// Replies that cannot be interpreted are never coerced into a default;
/// they surface as [`LedgerError::External`] with the raw text attached.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unparseable reply to {call}: {raw:?}")]
    External { call: &'static str, raw: String },

    #[error("{call} exited with status {status:?}: {stderr}")]
    NonZeroExit {
        call: &'static str,
        status: Option<i32>,
        stderr: String,
        stdout: String,
    },

    #[error("failed to run ledger process for {call}: {source}")]
    Process {
        call: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{call} timed out after {timeout:?}")]
    Timeout { call: &'static str, timeout: Duration },

    #[error("ledger JSON-RPC failure: {0}")]
    Rpc(String),
}

impl LedgerError {
    /// Raw output carried by the error, for diagnostics.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            LedgerError::External { raw, .. } => Some(raw),
            LedgerError::NonZeroExit { stderr, stdout, .. } => {
                Some(if stderr.is_empty() { stdout } else { stderr })
            }
            _ => None,
        }
    }
}
