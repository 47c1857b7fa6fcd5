//! HTTP surface of a meshgate node.
//!
//! Endpoints:
//! - `POST /register-node`: admit a node (registration coordinator)
//! - `GET /read`, `POST /write`, `POST /execute`, `POST /transmit`: capability checks
//! - `POST /acknowledgement`: receive a bootstrap acknowledgement
//! - `GET /get-nodes`: nodes this node has admitted
//! - `GET /health`, `GET /metrics`
//!
//! [`MeshClient`] is the other side: what a registering node uses to talk to
//! its registrar.

pub mod client;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod server;

pub use client::{AccessReply, ClientError, MeshClient, RegisterReply};
pub use error::RpcError;
pub use metrics::NodeMetrics;
pub use server::{router, RpcServer, RpcState};
