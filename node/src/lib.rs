//! A meshgate node.
//!
//! Wires the admission and capability components to a ledger, serves them
//! over HTTP and runs the proposal listener:
//! - [`NodeConfig`]: TOML configuration
//! - [`MeshNode`]: component wiring and process lifecycle
//! - [`HttpBootstrapDispatcher`]: delivers the ledger snapshot to newly registered nodes
//! - [`ShutdownController`]: signal handling and the root cancellation token

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod shutdown;

pub use bootstrap::HttpBootstrapDispatcher;
pub use config::{AdmissionConfig, NodeConfig};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use meshgate_rpc::NodeMetrics;
pub use node::MeshNode;
pub use shutdown::ShutdownController;
