//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use meshgate_admission::{AdmissionError, RegistrationOutcome, RegistrationRequest};
use meshgate_capability::{Decision, Enforcement, TokenEvent};
use meshgate_store::{BootstrapPart, RegistryEntry};
use meshgate_types::{Action, NodeType, Signature};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{RpcError, RpcState};

// ── Registration ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionSummary {
    pub candidate: String,
    pub initial_peers: u64,
    pub observed_peers: u64,
    pub peer_attempts: u32,
    pub convergence_attempts: u32,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterReply {
    pub status: String,
    /// `already_validator`, `non_validator` or `consensus_reached`.
    pub outcome: String,
    pub message: String,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission: Option<AdmissionSummary>,
}

impl From<RegistrationOutcome> for RegisterReply {
    fn from(outcome: RegistrationOutcome) -> Self {
        let outcome_label = outcome.label().to_string();
        let message = outcome.message();
        let (node_id, admission) = match outcome {
            RegistrationOutcome::AlreadyValidator { node_id, .. }
            | RegistrationOutcome::NonValidator { node_id, .. } => (node_id, None),
            RegistrationOutcome::ValidatorAdmitted { node_id, report } => (
                node_id,
                Some(AdmissionSummary {
                    candidate: report.candidate.to_string(),
                    initial_peers: report.initial_peers,
                    observed_peers: report.observed_peers,
                    peer_attempts: report.peer_attempts,
                    convergence_attempts: report.convergence_attempts,
                    elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                }),
            ),
        };
        Self {
            status: "success".into(),
            outcome: outcome_label,
            message,
            node_id,
            admission,
        }
    }
}

/// `POST /register-node`
///
/// The admission wait is bound to this request: if the caller goes away the
/// handler future is dropped and the wait is cancelled with it. A body that
/// is not a JSON object of the expected shape is a 400.
pub async fn register_node(
    State(state): State<RpcState>,
    body: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<Json<RegisterReply>, RpcError> {
    let Json(request) = body.map_err(|e| RpcError::InvalidRequest(e.body_text()))?;
    let node_id = request.node_id().to_string();
    info!(%node_id, "registration request received");

    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match state.coordinator.register(request, &cancel).await {
        Ok(outcome) => {
            state
                .metrics
                .registrations
                .with_label_values(&[outcome.label()])
                .inc();
            if matches!(outcome, RegistrationOutcome::ValidatorAdmitted { .. }) {
                state
                    .metrics
                    .validator_admissions
                    .with_label_values(&[outcome.label()])
                    .inc();
            }
            info!(%node_id, outcome = outcome.label(), "registration complete");
            Ok(Json(RegisterReply::from(outcome)))
        }
        Err(e) => {
            state.metrics.registrations.with_label_values(&[e.kind()]).inc();
            if matches!(
                e,
                AdmissionError::ConvergenceTimeout { .. }
                    | AdmissionError::Cancelled { .. }
                    | AdmissionError::AlreadyPending { .. }
            ) {
                state
                    .metrics
                    .validator_admissions
                    .with_label_values(&[e.kind()])
                    .inc();
            }
            warn!(%node_id, error = %e, "registration failed");
            Err(e.into())
        }
    }
}

// ── Actions ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct AccessQuery {
    pub signature: Option<String>,
    pub node_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessReply {
    /// `success` when the action is allowed, `failure` when denied.
    pub status: String,
    pub message: String,
    pub requester_id: String,
    pub partner_id: String,
    pub action: Action,
    pub decision: Decision,
    pub flow: String,
    pub permissions: Vec<Action>,
    pub token: TokenEvent,
}

impl AccessReply {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allowed
    }
}

impl From<Enforcement> for AccessReply {
    fn from(e: Enforcement) -> Self {
        let auth = e.authorization;
        let verb = auth.action.as_str().to_lowercase();
        let (status, message) = match auth.decision {
            Decision::Allowed => ("success", format!("Node {} is allowed to {verb}", e.requester_id)),
            Decision::Denied => ("failure", format!("Node {} is not allowed to {verb}", e.requester_id)),
        };
        Self {
            status: status.into(),
            message,
            requester_id: e.requester_id,
            partner_id: e.partner_id,
            action: auth.action,
            decision: auth.decision,
            flow: auth.policy.flow,
            permissions: auth.policy.permissions.iter().collect(),
            token: auth.token,
        }
    }
}

/// Route path serving `action`.
pub fn action_path(action: Action) -> &'static str {
    match action {
        Action::Read => "/read",
        Action::Write => "/write",
        Action::Execute => "/execute",
        Action::Transmit => "/transmit",
    }
}

/// Shared body of `/read`, `/write`, `/execute` and `/transmit`.
///
/// A denied action is still a 200; the decision is in the body's `status`.
pub async fn perform_action(
    state: RpcState,
    query: AccessQuery,
    action: Action,
) -> Result<Json<AccessReply>, RpcError> {
    let raw = query
        .signature
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RpcError::InvalidRequest("Missing signature".into()))?;
    let signature = Signature::from_hex(raw)
        .map_err(|e| RpcError::InvalidRequest(format!("Invalid signature: {e}")))?;
    let requester_id = query.node_id.unwrap_or_default();

    let label = action.as_str();
    match state.pep.enforce(&signature, &requester_id, action).await {
        Ok(enforcement) => {
            let auth = &enforcement.authorization;
            let decision = match auth.decision {
                Decision::Allowed => "allowed",
                Decision::Denied => "denied",
            };
            state
                .metrics
                .authorizations
                .with_label_values(&[label, decision])
                .inc();
            if auth.token != TokenEvent::Reused {
                state.metrics.tokens_issued.inc();
            }
            Ok(Json(AccessReply::from(enforcement)))
        }
        Err(e) => {
            state
                .metrics
                .authorizations
                .with_label_values(&[label, e.kind()])
                .inc();
            Err(e.into())
        }
    }
}

// ── Bootstrap acknowledgement ────────────────────────────────────────────

/// `POST /acknowledgement`: a registrar delivering the ledger snapshot.
pub async fn acknowledgement(
    State(state): State<RpcState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, RpcError> {
    let bad_form = |e: axum::extract::multipart::MultipartError| RpcError::InvalidRequest(e.to_string());

    let mut node_id = None;
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "node_id" {
            node_id = Some(field.text().await.map_err(bad_form)?);
            continue;
        }
        let Some(part) = BootstrapPart::from_field_name(&name) else {
            debug!(field = %name, "ignoring unknown acknowledgement field");
            continue;
        };
        parts.push((part, field.bytes().await.map_err(bad_form)?));
    }

    let node_id = node_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RpcError::InvalidRequest("Missing node_id".into()))?;

    let mut received = Vec::with_capacity(parts.len());
    for (part, bytes) in parts {
        state.bootstrap.save_part(part, &bytes).await?;
        received.push(part);
    }
    for part in BootstrapPart::ALL {
        if !received.contains(&part) {
            warn!(%node_id, field = part.field_name(), "acknowledgement without part");
        }
    }
    state.bootstrap.record_sender(&node_id, &received).await?;
    info!(%node_id, parts = received.len(), "bootstrap acknowledgement received");

    Ok(Json(json!({
        "status": "success",
        "message": "Acknowledgement received",
        "parts": received,
    })))
}

// ── Registry ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NodesQuery {
    pub node_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodesReply {
    pub count: usize,
    pub nodes: Vec<RegistryEntry>,
}

/// `GET /get-nodes?node_type=`
pub async fn get_nodes(
    State(state): State<RpcState>,
    Query(query): Query<NodesQuery>,
) -> Result<Json<NodesReply>, RpcError> {
    let filter = match query.node_type.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(
            raw.parse::<NodeType>()
                .map_err(|e| RpcError::InvalidRequest(e.to_string()))?,
        ),
        _ => None,
    };
    let nodes = state.registry.list(filter).await;
    Ok(Json(NodesReply {
        count: nodes.len(),
        nodes,
    }))
}

// ── Telemetry ────────────────────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<RpcState>) -> Result<impl IntoResponse, RpcError> {
    let text = state.metrics.encode().map_err(RpcError::Server)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgate_admission::AdmissionReport;
    use meshgate_types::NodeAddress;
    use std::time::Duration;

    fn admitted(elapsed: Duration) -> RegisterReply {
        RegisterReply::from(RegistrationOutcome::ValidatorAdmitted {
            node_id: "N-1".into(),
            report: AdmissionReport {
                candidate: NodeAddress::from_bytes(&[1; 20]),
                initial_peers: 1,
                observed_peers: 2,
                peer_attempts: 3,
                convergence_attempts: 4,
                elapsed,
            },
        })
    }

    #[test]
    fn admission_summary_reports_milliseconds() {
        let reply = admitted(Duration::from_millis(12_345));
        assert_eq!(reply.outcome, "consensus_reached");
        let summary = reply.admission.unwrap();
        assert_eq!(summary.elapsed_ms, 12_345);
        assert_eq!(summary.convergence_attempts, 4);
    }

    #[test]
    fn oversized_elapsed_saturates() {
        let reply = admitted(Duration::MAX);
        assert_eq!(reply.admission.unwrap().elapsed_ms, u64::MAX);
    }
}
