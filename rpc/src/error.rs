//! RPC error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use meshgate_admission::AdmissionError;
use meshgate_capability::CapabilityError;
use meshgate_store::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("server error: {0}")]
    Server(String),
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::Admission(e) => match e {
                AdmissionError::MissingField(_)
                | AdmissionError::InvalidField { .. }
                | AdmissionError::InvalidSignature { .. } => StatusCode::BAD_REQUEST,
                AdmissionError::Duplicate { .. } | AdmissionError::AlreadyPending { .. } => {
                    StatusCode::CONFLICT
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            RpcError::Capability(e) => match e {
                CapabilityError::PolicyParse { .. } => StatusCode::BAD_REQUEST,
                CapabilityError::RequesterNotRegistered { .. } | CapabilityError::PartnerUnknown => {
                    StatusCode::NOT_FOUND
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            RpcError::Store(_) | RpcError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller.
    pub fn message(&self) -> String {
        match self {
            RpcError::InvalidRequest(reason) => reason.clone(),
            RpcError::Admission(AdmissionError::InvalidSignature { .. }) => {
                "Signature verification failed".into()
            }
            RpcError::Admission(AdmissionError::Duplicate { .. }) => {
                "Node already registered on the ledger".into()
            }
            RpcError::Admission(AdmissionError::LedgerUnavailable(reason))
            | RpcError::Capability(CapabilityError::Unavailable(reason)) => {
                format!("Registry contract not deployed or unreachable: {reason}")
            }
            RpcError::Capability(CapabilityError::PolicyParse { .. }) => "Invalid policy format".into(),
            RpcError::Capability(CapabilityError::RequesterNotRegistered { node_id }) => {
                format!("Node {node_id} is not registered. Register the node first")
            }
            RpcError::Capability(CapabilityError::PartnerUnknown) => {
                "Details of the connected node not found.".into()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = json!({ "status": "error", "message": self.message() });
        (status, Json(body)).into_response()
    }
}
