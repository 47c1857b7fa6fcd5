//! Local state kept by a meshgate node.
//!
//! The ledger is the source of truth for identities, validators and tokens.
//! What lives here is node-local:
//!
//! - [`NodeRegistry`]: cache of nodes this node admitted, served by `/get-nodes`.
//!   Hydrated once at startup; the only write path is the [`RegistryWriter`]
//!   handed to the registration coordinator.
//! - [`PeerRecord`]: this node's own signed identity, the fixed interaction
//!   partner for capability checks.
//! - [`BootstrapState`]: files received in a bootstrap acknowledgement.

pub mod bootstrap;
pub mod error;
pub mod peer;
pub mod registry;

pub use bootstrap::{BootstrapPart, BootstrapState};
pub use error::StoreError;
pub use peer::PeerRecord;
pub use registry::{NodeRegistry, RegistryEntry, RegistryWriter};

use std::path::Path;

/// Write `bytes` to `path` via a sibling temp file and rename, creating parents.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
