//! Files received in a bootstrap acknowledgement.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{write_atomic, StoreError};

/// One part of a bootstrap acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPart {
    Genesis,
    NodeRegistry,
    PrefundedKeys,
    Contact,
}

impl BootstrapPart {
    pub const ALL: [BootstrapPart; 4] = [
        BootstrapPart::Genesis,
        BootstrapPart::NodeRegistry,
        BootstrapPart::PrefundedKeys,
        BootstrapPart::Contact,
    ];

    /// Multipart field name carrying this part.
    pub fn field_name(&self) -> &'static str {
        match self {
            BootstrapPart::Genesis => "genesis_file",
            BootstrapPart::NodeRegistry => "node_registry_file",
            BootstrapPart::PrefundedKeys => "prefunded_keys_file",
            BootstrapPart::Contact => "enode",
        }
    }

    /// File name the part is stored under.
    pub fn file_name(&self) -> &'static str {
        match self {
            BootstrapPart::Genesis => "genesis.json",
            BootstrapPart::NodeRegistry => "NodeRegistry.json",
            BootstrapPart::PrefundedKeys => "prefunded_keys.json",
            BootstrapPart::Contact => "enode.txt",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.field_name() == name)
    }
}

/// Directory holding the most recently received bootstrap parts.
#[derive(Clone, Debug)]
pub struct BootstrapState {
    dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct SenderNote<'a> {
    node_id: &'a str,
    parts: &'a [BootstrapPart],
}

impl BootstrapState {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, part: BootstrapPart) -> PathBuf {
        self.dir.join(part.file_name())
    }

    /// Store one part, replacing any earlier copy.
    pub async fn save_part(&self, part: BootstrapPart, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.path_of(part);
        write_atomic(&path, bytes).await?;
        info!(part = ?part, path = %path.display(), bytes = bytes.len(), "bootstrap part saved");
        Ok(path)
    }

    /// Record which node sent the acknowledgement and which parts it carried.
    pub async fn record_sender(&self, node_id: &str, parts: &[BootstrapPart]) -> Result<(), StoreError> {
        let note = SenderNote { node_id, parts };
        let bytes =
            serde_json::to_vec_pretty(&note).map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(&self.dir.join("acknowledgement.json"), &bytes).await
    }

    pub async fn read_part(&self, part: BootstrapPart) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_of(part);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip() {
        for part in BootstrapPart::ALL {
            assert_eq!(BootstrapPart::from_field_name(part.field_name()), Some(part));
        }
        assert_eq!(BootstrapPart::from_field_name("node_id"), None);
    }

    #[tokio::test]
    async fn parts_are_saved_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let state = BootstrapState::new(dir.path().join("bootstrap"));
        assert_eq!(state.read_part(BootstrapPart::Genesis).await.unwrap(), None);

        state.save_part(BootstrapPart::Genesis, b"{\"v\":1}").await.unwrap();
        state.save_part(BootstrapPart::Genesis, b"{\"v\":2}").await.unwrap();
        assert_eq!(
            state.read_part(BootstrapPart::Genesis).await.unwrap().unwrap(),
            b"{\"v\":2}"
        );
        assert!(state.path_of(BootstrapPart::Genesis).ends_with("genesis.json"));
    }

    #[tokio::test]
    async fn sender_note_written() {
        let dir = tempfile::tempdir().unwrap();
        let state = BootstrapState::new(dir.path());
        state
            .record_sender("F-1", &[BootstrapPart::Genesis, BootstrapPart::Contact])
            .await
            .unwrap();
        let raw = std::fs::read_to_string(dir.path().join("acknowledgement.json")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["node_id"], "F-1");
        assert_eq!(v["parts"][1], "contact");
    }
}
