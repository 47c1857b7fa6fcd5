//! Cache of nodes admitted by this node.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use meshgate_types::{NodeAddress, NodeIdentity, NodeType, PublicKey};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{write_atomic, StoreError};

/// One admitted node as served by `/get-nodes`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub node_id: String,
    pub node_name: String,
    pub node_type: NodeType,
    pub public_key: PublicKey,
    pub address: NodeAddress,
}

impl From<&NodeIdentity> for RegistryEntry {
    fn from(identity: &NodeIdentity) -> Self {
        Self {
            node_id: identity.node_id.clone(),
            node_name: identity.node_name.clone(),
            node_type: identity.node_type,
            public_key: identity.public_key.clone(),
            address: identity.address.clone(),
        }
    }
}

type Entries = Arc<RwLock<BTreeMap<String, RegistryEntry>>>;

/// Read handle on the registry cache. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    entries: Entries,
}

/// The single write handle on the registry cache.
///
/// Not `Clone`: whoever holds it is the only component that mutates the
/// cache, and every mutation is persisted before it returns.
#[derive(Debug)]
pub struct RegistryWriter {
    entries: Entries,
    path: Option<PathBuf>,
}

impl NodeRegistry {
    /// Registry kept only in memory (tests, ephemeral nodes).
    pub fn in_memory() -> (NodeRegistry, RegistryWriter) {
        let entries = Entries::default();
        (
            NodeRegistry {
                entries: entries.clone(),
            },
            RegistryWriter {
                entries,
                path: None,
            },
        )
    }

    /// Load the registry snapshot at `path`. A missing file is an empty registry.
    pub fn hydrate(path: impl Into<PathBuf>) -> Result<(NodeRegistry, RegistryWriter), StoreError> {
        let path = path.into();
        let map = match std::fs::read(&path) {
            Ok(bytes) => {
                let list: Vec<RegistryEntry> =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corruption {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                list.into_iter()
                    .map(|entry| (entry.node_id.clone(), entry))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        info!(path = %path.display(), nodes = map.len(), "registry hydrated");
        let entries = Arc::new(RwLock::new(map));
        Ok((
            NodeRegistry {
                entries: entries.clone(),
            },
            RegistryWriter {
                entries,
                path: Some(path),
            },
        ))
    }

    pub async fn get(&self, node_id: &str) -> Option<RegistryEntry> {
        self.entries.read().await.get(node_id).cloned()
    }

    /// All entries, optionally restricted to one node type, ordered by node id.
    pub async fn list(&self, node_type: Option<NodeType>) -> Vec<RegistryEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| node_type.map_or(true, |t| e.node_type == t))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl RegistryWriter {
    /// Insert or replace an entry and persist the snapshot.
    ///
    /// The in-memory cache is only updated once the snapshot is on disk.
    pub async fn record(&self, entry: RegistryEntry) -> Result<(), StoreError> {
        let mut guard = self.entries.write().await;
        let mut next = guard.clone();
        debug!(node_id = %entry.node_id, "recording registry entry");
        next.insert(entry.node_id.clone(), entry);
        if let Some(path) = &self.path {
            persist(path, &next).await?;
        }
        *guard = next;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

async fn persist(path: &Path, entries: &BTreeMap<String, RegistryEntry>) -> Result<(), StoreError> {
    let list: Vec<&RegistryEntry> = entries.values().collect();
    let bytes =
        serde_json::to_vec_pretty(&list).map_err(|e| StoreError::Serialization(e.to_string()))?;
    write_atomic(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, node_type: NodeType) -> RegistryEntry {
        RegistryEntry {
            node_id: id.into(),
            node_name: format!("{id}-name"),
            node_type,
            public_key: PublicKey([1; 32]),
            address: NodeAddress::from_bytes(&[2; 20]),
        }
    }

    #[tokio::test]
    async fn writer_updates_reader() {
        let (reader, writer) = NodeRegistry::in_memory();
        assert!(reader.is_empty().await);
        writer.record(entry("F-1", NodeType::Fog)).await.unwrap();
        assert_eq!(reader.len().await, 1);
        assert_eq!(reader.get("F-1").await.unwrap().node_name, "F-1-name");
    }

    #[tokio::test]
    async fn list_filters_by_type() {
        let (reader, writer) = NodeRegistry::in_memory();
        writer.record(entry("E-1", NodeType::Edge)).await.unwrap();
        writer.record(entry("F-1", NodeType::Fog)).await.unwrap();
        writer.record(entry("E-2", NodeType::Edge)).await.unwrap();

        let edges = reader.list(Some(NodeType::Edge)).await;
        let ids: Vec<&str> = edges.iter().map(|e| e.node_id.as_str()).collect();
        assert_eq!(ids, vec!["E-1", "E-2"]);
        assert_eq!(reader.list(None).await.len(), 3);
        assert!(reader.list(Some(NodeType::Sensor)).await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_survives_rehydration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.json");

        let (_, writer) = NodeRegistry::hydrate(&path).unwrap();
        writer.record(entry("S-1", NodeType::Sensor)).await.unwrap();
        drop(writer);

        let (reader, _) = NodeRegistry::hydrate(&path).unwrap();
        assert_eq!(reader.get("S-1").await.unwrap().node_type, NodeType::Sensor);
    }

    #[test]
    fn corrupted_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            NodeRegistry::hydrate(&path),
            Err(StoreError::Corruption { .. })
        ));
    }
}
