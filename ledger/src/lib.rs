//! Typed client for the external ledger.
//!
//! The ledger is an out-of-process authority holding node records, the
//! validator set and capability tokens. Every other meshgate component talks
//! to it through the object-safe [`LedgerClient`] trait. The production
//! implementation, [`CommandLedger`], drives the ledger's command script one
//! call per child process; [`NodeInfoClient`] reads the local ledger node's
//! contact descriptor over JSON-RPC.

pub mod client;
pub mod command;
pub mod command_ledger;
pub mod contract;
pub mod error;
pub mod node_info;
pub mod reply;
pub mod transport;

pub use client::{LedgerClient, Receipt, RegisterOutcome, RegisteredNode, Registration, ValidatorSet};
pub use command::LedgerCommand;
pub use command_ledger::CommandLedger;
pub use contract::{ContractProbe, ContractStatus};
pub use error::LedgerError;
pub use node_info::{ContactDescriptor, NodeInfoClient};
pub use transport::{CommandTransport, ProcessTransport};
