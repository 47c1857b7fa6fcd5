//! This node's own signed identity (`node-details.json`).
//!
//! The record is written by the client side when the node registers itself
//! with a registrar, which can happen after the server has started. Reads
//! therefore fall back to disk until the record has been seen once; after
//! that it is served from memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use meshgate_types::SignedIdentity;
use tokio::sync::RwLock;
use tracing::info;

use crate::{write_atomic, StoreError};

#[derive(Clone, Debug)]
pub struct PeerRecord {
    path: PathBuf,
    cached: Arc<RwLock<Option<SignedIdentity>>>,
}

impl PeerRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Arc::default(),
        }
    }

    /// A record that is already known and never read from disk.
    pub fn fixed(path: impl Into<PathBuf>, identity: SignedIdentity) -> Self {
        Self {
            path: path.into(),
            cached: Arc::new(RwLock::new(Some(identity))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The local signed identity, or `None` if this node has not registered yet.
    pub async fn current(&self) -> Result<Option<SignedIdentity>, StoreError> {
        if let Some(identity) = self.cached.read().await.as_ref() {
            return Ok(Some(identity.clone()));
        }
        let Some(identity) = Self::read_file(&self.path).await? else {
            return Ok(None);
        };
        info!(node_id = %identity.identity.node_id, "local peer record loaded");
        *self.cached.write().await = Some(identity.clone());
        Ok(Some(identity))
    }

    /// Persist the local signed identity and cache it.
    pub async fn save(&self, identity: &SignedIdentity) -> Result<(), StoreError> {
        Self::write_file(&self.path, identity).await?;
        *self.cached.write().await = Some(identity.clone());
        Ok(())
    }

    /// Write a peer record file without keeping a handle around.
    pub async fn write_file(path: &Path, identity: &SignedIdentity) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(identity)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(path, &bytes).await
    }

    async fn read_file(path: &Path) -> Result<Option<SignedIdentity>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corruption {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}
