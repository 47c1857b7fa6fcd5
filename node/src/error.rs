use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] meshgate_ledger::LedgerError),

    #[error("store error: {0}")]
    Store(#[from] meshgate_store::StoreError),

    #[error("HTTP server error: {0}")]
    Rpc(#[from] meshgate_rpc::RpcError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
