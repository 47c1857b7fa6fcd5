//! Node identities and their mesh tiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{NodeAddress, PublicKey, Signature, TypesError};

/// Tier of a node in the mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Cloud,
    Fog,
    Edge,
    Sensor,
    Activator,
}

impl NodeType {
    pub const ALL: [NodeType; 5] = [
        NodeType::Cloud,
        NodeType::Fog,
        NodeType::Edge,
        NodeType::Sensor,
        NodeType::Activator,
    ];

    /// Canonical name, as signed and as passed to the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Cloud => "Cloud",
            NodeType::Fog => "Fog",
            NodeType::Edge => "Edge",
            NodeType::Sensor => "Sensor",
            NodeType::Activator => "Activator",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(NodeType::Cloud),
            "fog" => Ok(NodeType::Fog),
            "edge" => Ok(NodeType::Edge),
            "sensor" => Ok(NodeType::Sensor),
            "activator" | "actuator" => Ok(NodeType::Activator),
            _ => Err(TypesError::UnknownNodeType(s.to_string())),
        }
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The self-declared identity of a node. Immutable once registered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: String,
    pub node_name: String,
    pub node_type: NodeType,
    pub public_key: PublicKey,
    pub address: NodeAddress,
    /// Base URL the bootstrap acknowledgement is pushed to.
    #[serde(alias = "node_url")]
    pub callback_url: String,
    /// JSON-RPC endpoint of the node's ledger client, if it runs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

/// A [`NodeIdentity`] together with the signature over its canonical message.
///
/// Serialized flat, so the wire form is the identity's fields plus `signature`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedIdentity {
    #[serde(flatten)]
    pub identity: NodeIdentity,
    pub signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_aliases() {
        assert_eq!("fog".parse::<NodeType>().unwrap(), NodeType::Fog);
        assert_eq!("Actuator".parse::<NodeType>().unwrap(), NodeType::Activator);
        assert_eq!("CLOUD".parse::<NodeType>().unwrap(), NodeType::Cloud);
        assert!("satellite".parse::<NodeType>().is_err());
    }

    #[test]
    fn signed_identity_is_flat_on_the_wire() {
        let json = serde_json::json!({
            "node_id": "n-1",
            "node_name": "edge-one",
            "node_type": "edge",
            "public_key": format!("0x{}", "22".repeat(32)),
            "address": format!("0x{}", "33".repeat(20)),
            "node_url": "http://10.0.0.5:5000",
            "signature": format!("0x{}", "44".repeat(64)),
        });
        let signed: SignedIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(signed.identity.node_type, NodeType::Edge);
        assert_eq!(signed.identity.callback_url, "http://10.0.0.5:5000");
        assert_eq!(signed.identity.rpc_url, None);

        let back = serde_json::to_value(&signed).unwrap();
        assert_eq!(back["node_type"], "Edge");
        assert_eq!(back["callback_url"], "http://10.0.0.5:5000");
        assert!(back.get("rpc_url").is_none());
    }
}
