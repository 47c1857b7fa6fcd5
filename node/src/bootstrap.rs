//! HTTP delivery of the bootstrap acknowledgement.
//!
//! After a node is registered, the admitting node pushes everything it needs
//! to join the ledger network to `<callback_url>/acknowledgement` as one
//! multipart form:
//!
//! | field                 | content                               |
//! |-----------------------|---------------------------------------|
//! | `node_id`             | id of the registered node             |
//! | `enode`               | this node's ledger contact descriptor |
//! | `genesis_file`        | genesis block definition              |
//! | `node_registry_file`  | registry contract descriptor          |
//! | `prefunded_keys_file` | prefunded accounts (optional)         |

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use meshgate_admission::{AdmissionError, BootstrapDispatcher};
use meshgate_ledger::NodeInfoClient;
use meshgate_store::BootstrapPart;
use meshgate_types::NodeIdentity;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use crate::NodeConfig;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpBootstrapDispatcher {
    genesis: PathBuf,
    node_registry: PathBuf,
    prefunded_keys: Option<PathBuf>,
    node_info: NodeInfoClient,
    http_client: reqwest::Client,
}

impl HttpBootstrapDispatcher {
    pub fn new(
        genesis: impl Into<PathBuf>,
        node_registry: impl Into<PathBuf>,
        prefunded_keys: Option<PathBuf>,
        node_info: NodeInfoClient,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            genesis: genesis.into(),
            node_registry: node_registry.into(),
            prefunded_keys,
            node_info,
            http_client,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(
            config.genesis_file.clone(),
            config.contract_artifact.clone(),
            config.prefunded_keys_file.clone(),
            NodeInfoClient::new(config.ledger_rpc_url.clone()),
        )
    }

    async fn file_part(part: BootstrapPart, path: &Path) -> Result<Part, AdmissionError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AdmissionError::Bootstrap(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(Part::bytes(bytes).file_name(part.file_name()))
    }

    async fn build_form(&self, target: &NodeIdentity) -> Result<Form, AdmissionError> {
        let contact = self
            .node_info
            .contact_descriptor()
            .await
            .map_err(|e| AdmissionError::Bootstrap(format!("contact descriptor unavailable: {e}")))?;

        let mut form = Form::new()
            .text("node_id", target.node_id.clone())
            .text(BootstrapPart::Contact.field_name(), contact.to_string())
            .part(
                BootstrapPart::Genesis.field_name(),
                Self::file_part(BootstrapPart::Genesis, &self.genesis).await?,
            )
            .part(
                BootstrapPart::NodeRegistry.field_name(),
                Self::file_part(BootstrapPart::NodeRegistry, &self.node_registry).await?,
            );
        if let Some(keys) = &self.prefunded_keys {
            form = form.part(
                BootstrapPart::PrefundedKeys.field_name(),
                Self::file_part(BootstrapPart::PrefundedKeys, keys).await?,
            );
        }
        Ok(form)
    }
}

#[async_trait]
impl BootstrapDispatcher for HttpBootstrapDispatcher {
    async fn dispatch(&self, target: &NodeIdentity) -> Result<(), AdmissionError> {
        let url = format!(
            "{}/acknowledgement",
            target.callback_url.trim_end_matches('/')
        );
        let form = self.build_form(target).await?;
        debug!(node_id = %target.node_id, %url, "sending bootstrap acknowledgement");

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdmissionError::Bootstrap(format!("{url}: request timed out: {e}"))
                } else if e.is_connect() {
                    AdmissionError::Bootstrap(format!("{url}: connection failed: {e}"))
                } else {
                    AdmissionError::Bootstrap(format!("{url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdmissionError::Bootstrap(format!(
                "{url} returned {status}: {body}"
            )));
        }
        info!(node_id = %target.node_id, "bootstrap acknowledgement delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use meshgate_types::{NodeAddress, NodeType, PublicKey};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

    const ENODE_KEY: &str = "ab";

    fn enode() -> String {
        format!("enode://{}@10.0.0.7:30303", ENODE_KEY.repeat(64))
    }

    async fn collect(State(received): State<Received>, mut multipart: Multipart) -> StatusCode {
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap().to_string();
            let bytes = field.bytes().await.unwrap();
            received.lock().unwrap().insert(name, bytes.to_vec());
        }
        StatusCode::OK
    }

    async fn node_info() -> Json<Value> {
        Json(json!({"jsonrpc": "2.0", "id": 1, "result": {"enode": enode()}}))
    }

    async fn spawn(ack_status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route("/rpc", post(node_info))
            .route(
                "/acknowledgement",
                post(move |state: State<Received>, form: Multipart| async move {
                    let status = collect(state, form).await;
                    if ack_status.is_success() { status } else { ack_status }
                }),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), received)
    }

    fn target(callback_url: &str) -> NodeIdentity {
        NodeIdentity {
            node_id: "N-2".into(),
            node_name: "gateway".into(),
            node_type: NodeType::Fog,
            public_key: PublicKey([3; 32]),
            address: NodeAddress::from_bytes(&[4; 20]),
            callback_url: callback_url.into(),
            rpc_url: None,
        }
    }

    fn files(dir: &Path, with_keys: bool) -> (PathBuf, PathBuf, Option<PathBuf>) {
        let genesis = dir.join("genesis.json");
        let registry = dir.join("NodeRegistry.json");
        std::fs::write(&genesis, br#"{"config":{}}"#).unwrap();
        std::fs::write(&registry, br#"{"address":"0x01"}"#).unwrap();
        let keys = with_keys.then(|| {
            let keys = dir.join("prefunded.json");
            std::fs::write(&keys, b"[]").unwrap();
            keys
        });
        (genesis, registry, keys)
    }

    #[tokio::test]
    async fn delivers_all_parts() {
        let (base, received) = spawn(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let (genesis, registry, keys) = files(dir.path(), true);
        let dispatcher = HttpBootstrapDispatcher::new(
            genesis,
            registry,
            keys,
            NodeInfoClient::new(format!("{base}/rpc")),
        );

        dispatcher.dispatch(&target(&format!("{base}/"))).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received["node_id"], b"N-2");
        assert_eq!(received["enode"], enode().as_bytes());
        assert_eq!(received["genesis_file"], br#"{"config":{}}"#);
        assert_eq!(received["node_registry_file"], br#"{"address":"0x01"}"#);
        assert_eq!(received["prefunded_keys_file"], b"[]");
    }

    #[tokio::test]
    async fn prefunded_keys_are_optional() {
        let (base, received) = spawn(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let (genesis, registry, _) = files(dir.path(), false);
        let dispatcher = HttpBootstrapDispatcher::new(
            genesis,
            registry,
            None,
            NodeInfoClient::new(format!("{base}/rpc")),
        );

        dispatcher.dispatch(&target(&base)).await.unwrap();
        assert!(!received.lock().unwrap().contains_key("prefunded_keys_file"));
    }

    #[tokio::test]
    async fn rejected_acknowledgement_is_an_error() {
        let (base, _) = spawn(StatusCode::BAD_REQUEST).await;
        let dir = tempfile::tempdir().unwrap();
        let (genesis, registry, _) = files(dir.path(), false);
        let dispatcher = HttpBootstrapDispatcher::new(
            genesis,
            registry,
            None,
            NodeInfoClient::new(format!("{base}/rpc")),
        );

        let err = dispatcher.dispatch(&target(&base)).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Bootstrap(_)));
    }

    #[tokio::test]
    async fn missing_genesis_fails_before_sending() {
        let (base, received) = spawn(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = HttpBootstrapDispatcher::new(
            dir.path().join("absent.json"),
            dir.path().join("absent-registry.json"),
            None,
            NodeInfoClient::new(format!("{base}/rpc")),
        );

        let err = dispatcher.dispatch(&target(&base)).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Bootstrap(msg) if msg.contains("cannot read")));
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_ledger_rpc_is_an_error() {
        let (base, _) = spawn(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let (genesis, registry, _) = files(dir.path(), false);
        let dispatcher = HttpBootstrapDispatcher::new(
            genesis,
            registry,
            None,
            NodeInfoClient::new("http://127.0.0.1:1/"),
        );

        let err = dispatcher.dispatch(&target(&base)).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Bootstrap(msg) if msg.contains("contact descriptor")));
    }
}
