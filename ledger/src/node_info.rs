//! JSON-RPC probe for the local ledger node's contact descriptor.
//!
//! A newly admitted node needs the admitting node's peer URL
//! (`enode://<node key>@<ip>:<port>`) to join the ledger network; it is read
//! from `admin_nodeInfo` and shipped with the bootstrap acknowledgement.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::LedgerError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hex length of the node public key in a contact descriptor.
const NODE_KEY_HEX_LEN: usize = 128;

/// A validated `enode://` peer URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactDescriptor {
    pub node_key: String,
    pub host: IpAddr,
    pub port: u16,
}

impl fmt::Display for ContactDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enode://{}@{}:{}", self.node_key, self.host, self.port)
    }
}

impl FromStr for ContactDescriptor {
    type Err = String;

    /// Parses `enode://<128 hex>@<ip>:<port>`, ignoring any `?query` suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .trim()
            .strip_prefix("enode://")
            .ok_or_else(|| format!("missing enode:// scheme in {s:?}"))?;
        let rest = rest.split('?').next().unwrap_or(rest);
        let (node_key, endpoint) = rest
            .split_once('@')
            .ok_or_else(|| format!("missing '@' in {s:?}"))?;
        if node_key.len() != NODE_KEY_HEX_LEN || !node_key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("node key must be {NODE_KEY_HEX_LEN} hex chars"));
        }
        let (host, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in {s:?}"))?;
        let host: IpAddr = host.parse().map_err(|e| format!("bad host {host:?}: {e}"))?;
        let port: u16 = port.parse().map_err(|e| format!("bad port {port:?}: {e}"))?;
        Ok(Self {
            node_key: node_key.to_ascii_lowercase(),
            host,
            port,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<NodeInfo>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    enode: String,
}

/// Client for the ledger node's JSON-RPC endpoint.
pub struct NodeInfoClient {
    http_client: reqwest::Client,
    rpc_url: String,
}

impl NodeInfoClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            rpc_url: rpc_url.into(),
        }
    }

    /// Fetch and validate the node's contact descriptor via `admin_nodeInfo`.
    pub async fn contact_descriptor(&self) -> Result<ContactDescriptor, LedgerError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "admin_nodeInfo",
            "params": [],
            "id": 1,
        });
        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Rpc(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    LedgerError::Rpc(format!("connection failed: {e}"))
                } else {
                    LedgerError::Rpc(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LedgerError::Rpc(format!("HTTP status {}", response.status())));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Rpc(format!("invalid admin_nodeInfo response: {e}")))?;
        let info = match (body.result, body.error) {
            (Some(info), _) => info,
            (None, Some(err)) => return Err(LedgerError::Rpc(err.to_string())),
            (None, None) => return Err(LedgerError::Rpc("admin_nodeInfo returned no result".into())),
        };
        info.enode.parse().map_err(|_| LedgerError::External {
            call: "admin_nodeInfo",
            raw: info.enode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    fn key() -> String {
        "ab".repeat(64)
    }

    #[test]
    fn parses_descriptor_and_drops_query() {
        let raw = format!("enode://{}@172.16.0.2:30303?discport=0", key());
        let d: ContactDescriptor = raw.parse().unwrap();
        assert_eq!(d.port, 30303);
        assert_eq!(d.host.to_string(), "172.16.0.2");
        assert_eq!(d.to_string(), format!("enode://{}@172.16.0.2:30303", key()));
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!("http://x@1.2.3.4:1".parse::<ContactDescriptor>().is_err());
        assert!(format!("enode://{}@1.2.3.4", key()).parse::<ContactDescriptor>().is_err());
        assert!("enode://abcd@1.2.3.4:30303".parse::<ContactDescriptor>().is_err());
        assert!(format!("enode://{}@not-an-ip:30303", key())
            .parse::<ContactDescriptor>()
            .is_err());
    }

    async fn serve(reply: serde_json::Value) -> String {
        let app = Router::new().route("/", post(move || async move { Json(reply) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn fetches_descriptor_over_json_rpc() {
        let enode = format!("enode://{}@127.0.0.1:30304", key());
        let url = serve(json!({"jsonrpc":"2.0","id":1,"result":{"enode": enode}})).await;
        let d = NodeInfoClient::new(url).contact_descriptor().await.unwrap();
        assert_eq!(d.port, 30304);
    }

    #[tokio::test]
    async fn malformed_enode_is_external_error() {
        let url = serve(json!({"jsonrpc":"2.0","id":1,"result":{"enode":"garbage"}})).await;
        let err = NodeInfoClient::new(url).contact_descriptor().await.unwrap_err();
        assert!(matches!(err, LedgerError::External { raw, .. } if raw == "garbage"));
    }

    #[tokio::test]
    async fn rpc_error_is_reported() {
        let url = serve(json!({"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}})).await;
        let err = NodeInfoClient::new(url).contact_descriptor().await.unwrap_err();
        assert!(matches!(err, LedgerError::Rpc(msg) if msg.contains("method not found")));
    }
}
