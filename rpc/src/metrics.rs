//! Prometheus metrics for a meshgate node.
//!
//! The [`NodeMetrics`] struct owns a dedicated [`Registry`] that the
//! `/metrics` endpoint encodes into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, Encoder,
    IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct NodeMetrics {
    pub registry: Registry,

    /// Registration requests by terminal state (`non_validator`, `duplicate`, ...).
    pub registrations: IntCounterVec,
    /// Capability checks by action and decision (or error kind).
    pub authorizations: IntCounterVec,
    /// Tokens issued or reissued on the ledger while authorizing.
    pub tokens_issued: IntCounter,
    /// Validator admissions by outcome (`consensus_reached`, `timeout`, ...).
    pub validator_admissions: IntCounterVec,
    /// Votes cast by the proposal listener.
    pub listener_votes: IntCounter,
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let registrations = register_int_counter_vec_with_registry!(
            Opts::new("meshgate_registrations_total", "Registration requests by outcome"),
            &["outcome"],
            registry
        )
        .expect("failed to register registrations counter");

        let authorizations = register_int_counter_vec_with_registry!(
            Opts::new(
                "meshgate_authorizations_total",
                "Capability checks by action and decision"
            ),
            &["action", "decision"],
            registry
        )
        .expect("failed to register authorizations counter");

        let tokens_issued = register_int_counter_with_registry!(
            Opts::new(
                "meshgate_tokens_issued_total",
                "Capability tokens issued or reissued"
            ),
            registry
        )
        .expect("failed to register tokens_issued counter");

        let validator_admissions = register_int_counter_vec_with_registry!(
            Opts::new(
                "meshgate_validator_admissions_total",
                "Validator admission waits by outcome"
            ),
            &["outcome"],
            registry
        )
        .expect("failed to register validator_admissions counter");

        let listener_votes = register_int_counter_with_registry!(
            Opts::new(
                "meshgate_listener_votes_total",
                "Votes cast by the proposal listener"
            ),
            registry
        )
        .expect("failed to register listener_votes counter");

        Self {
            registry,
            registrations,
            authorizations,
            tokens_issued,
            validator_admissions,
            listener_votes,
        }
    }

    /// Encode every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let metrics = NodeMetrics::new();
        metrics.registrations.with_label_values(&["non_validator"]).inc();
        metrics
            .authorizations
            .with_label_values(&["READ", "allowed"])
            .inc_by(2);
        metrics.listener_votes.inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("meshgate_registrations_total{outcome=\"non_validator\"} 1"));
        assert!(text.contains("meshgate_authorizations_total{action=\"READ\",decision=\"allowed\"} 2"));
        assert!(text.contains("meshgate_listener_votes_total 1"));
    }

    #[test]
    fn separate_instances_do_not_collide() {
        let a = NodeMetrics::new();
        let b = NodeMetrics::new();
        a.tokens_issued.inc();
        assert_eq!(a.tokens_issued.get(), 1);
        assert_eq!(b.tokens_issued.get(), 0);
    }
}
