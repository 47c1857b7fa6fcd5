//! HTTP client used by a node to register with a registrar and request actions.

use std::time::Duration;

use meshgate_types::{Action, Signature, SignedIdentity};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

pub use crate::handlers::{AccessReply, RegisterReply};

/// Registration may include the whole validator admission wait.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("registrar unreachable: {0}")]
    Unreachable(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The registrar answered with an error status.
    #[error("registrar returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for one registrar's HTTP surface.
pub struct MeshClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl MeshClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /register-node` with a signed identity.
    pub async fn register(&self, signed: &SignedIdentity) -> Result<RegisterReply, ClientError> {
        let url = format!("{}/register-node", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(signed)
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }

    /// Ask the registrar whether `node_id` may perform `action`.
    pub async fn access(
        &self,
        action: Action,
        signature: &Signature,
        node_id: &str,
    ) -> Result<AccessReply, ClientError> {
        let url = format!("{}/{}", self.base_url, action.as_str().to_lowercase());
        let query = [("signature", signature.to_hex()), ("node_id", node_id.to_string())];
        let request = match action {
            Action::Read => self.http_client.get(&url),
            _ => self.http_client.post(&url),
        };
        let response = request
            .query(&query)
            .send()
            .await
            .map_err(map_send_error)?;
        decode(response).await
    }
}

fn map_send_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Unreachable(format!("request timed out: {e}"))
    } else if e.is_connect() {
        ClientError::Unreachable(format!("connection failed: {e}"))
    } else {
        ClientError::RequestFailed(e.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
        return Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_slice(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}
