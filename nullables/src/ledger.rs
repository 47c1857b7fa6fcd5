//! Nullable ledger: an in-memory [`LedgerClient`] that can be scripted.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use meshgate_ledger::{
    LedgerClient, LedgerError, Receipt, RegisterOutcome, RegisteredNode, Registration,
    ValidatorSet,
};
use meshgate_types::{CapabilityToken, NodeAddress, Signature};

use crate::NullClock;

/// Policy attached to tokens the null ledger issues unless told otherwise.
pub const DEFAULT_POLICY: &str = "default:READ,WRITE";

#[derive(Default)]
struct State {
    deployed: bool,
    nodes: HashMap<Signature, RegisteredNode>,
    validator_flags: HashSet<Signature>,
    validators: BTreeSet<NodeAddress>,
    peer_counts: VecDeque<u64>,
    last_peer_count: u64,
    /// Validator set polls still required before a voted address appears.
    convergence_delay: usize,
    pending_votes: Vec<(NodeAddress, usize)>,
    emitted: Vec<NodeAddress>,
    observed: Vec<NodeAddress>,
    votes: Vec<(NodeAddress, bool)>,
    tokens: HashMap<(Signature, Signature), CapabilityToken>,
    policy: String,
    failures: HashMap<&'static str, String>,
    refuse_registration: Option<String>,
    calls: Vec<&'static str>,
}

/// In-memory ledger for tests.
///
/// - Registrations are keyed by signature; a second registration of the same
///   signature reports `AlreadyRegistered`.
/// - `getPeerCount` replays a scripted sequence, repeating its last value.
/// - An affirmative vote puts the address into the validator set after
///   [`NullLedger::converge_after`] further validator set queries.
/// - Tokens are stamped with the shared [`NullClock`] and expire when
///   `now >= issued_at + validity`.
pub struct NullLedger {
    state: Mutex<State>,
    clock: NullClock,
}

impl NullLedger {
    /// A ledger with the contract deployed and an empty registry.
    pub fn new() -> Self {
        Self::with_clock(NullClock::new(1_700_000_000))
    }

    pub fn with_clock(clock: NullClock) -> Self {
        Self {
            state: Mutex::new(State {
                deployed: true,
                policy: DEFAULT_POLICY.to_string(),
                ..State::default()
            }),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn clock(&self) -> &NullClock {
        &self.clock
    }

    pub fn set_deployed(&self, deployed: bool) {
        self.state().deployed = deployed;
    }

    /// Mark a signature as belonging to a validator-flagged node.
    pub fn flag_validator(&self, signature: &Signature) {
        self.state().validator_flags.insert(signature.clone());
    }

    pub fn unflag_validator(&self, signature: &Signature) {
        self.state().validator_flags.remove(signature);
    }

    /// Seed the validator set (genesis validators).
    pub fn seed_validator(&self, address: NodeAddress) {
        self.state().validators.insert(address);
    }

    /// Replies for successive `getPeerCount` calls; the last one repeats.
    pub fn script_peer_counts(&self, counts: impl IntoIterator<Item = u64>) {
        self.state().peer_counts = counts.into_iter().collect();
    }

    pub fn converge_after(&self, polls: usize) {
        self.state().convergence_delay = polls;
    }

    /// Proposal events the ledger reports besides the ones emitted through it.
    pub fn observe_proposal(&self, address: NodeAddress) {
        self.state().observed.push(address);
    }

    /// Policy line attached to newly issued tokens.
    pub fn set_policy(&self, policy: impl Into<String>) {
        self.state().policy = policy.into();
    }

    /// Make every subsequent `call` reply with unparseable text.
    pub fn fail_call(&self, call: &'static str, raw: impl Into<String>) {
        self.state().failures.insert(call, raw.into());
    }

    pub fn clear_failure(&self, call: &'static str) {
        self.state().failures.remove(call);
    }

    /// Answer every later `registerNode` with a transaction failure.
    pub fn refuse_registrations(&self, detail: impl Into<String>) {
        self.state().refuse_registration = Some(detail.into());
    }

    /// Names of every call made, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub fn votes(&self) -> Vec<(NodeAddress, bool)> {
        self.state().votes.clone()
    }

    pub fn emitted_proposals(&self) -> Vec<NodeAddress> {
        self.state().emitted.clone()
    }

    pub fn registered(&self, signature: &Signature) -> Option<RegisteredNode> {
        self.state().nodes.get(signature).cloned()
    }

    pub fn token(&self, from: &Signature, to: &Signature) -> Option<CapabilityToken> {
        self.state().tokens.get(&(from.clone(), to.clone())).cloned()
    }

    fn enter(&self, call: &'static str) -> Result<MutexGuard<'_, State>, LedgerError> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(raw) = state.failures.get(call) {
            return Err(LedgerError::External {
                call,
                raw: raw.clone(),
            });
        }
        Ok(state)
    }

    fn issue(&self, state: &mut State, from: &Signature, to: &Signature) -> CapabilityToken {
        let token = CapabilityToken {
            from: from.clone(),
            to: to.clone(),
            policy: Some(state.policy.clone()),
            issued_at: self.clock.now(),
            is_issued: true,
            is_revoked: false,
        };
        state
            .tokens
            .insert((from.clone(), to.clone()), token.clone());
        token
    }
}

impl Default for NullLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for NullLedger {
    async fn check_contract_deployed(&self) -> Result<bool, LedgerError> {
        Ok(self.enter("checkIfDeployed")?.deployed)
    }

    async fn is_registered(&self, signature: &Signature) -> Result<bool, LedgerError> {
        Ok(self.enter("isNodeRegistered")?.nodes.contains_key(signature))
    }

    async fn get_details(&self, signature: &Signature) -> Result<Option<RegisteredNode>, LedgerError> {
        Ok(self.enter("getNodeDetails")?.nodes.get(signature).cloned())
    }

    async fn register_node(&self, registration: &Registration) -> Result<RegisterOutcome, LedgerError> {
        let mut state = self.enter("registerNode")?;
        if state.nodes.contains_key(&registration.signature) {
            return Ok(RegisterOutcome::AlreadyRegistered);
        }
        if let Some(detail) = &state.refuse_registration {
            return Ok(RegisterOutcome::Failed {
                detail: detail.clone(),
            });
        }
        let identity = &registration.identity;
        let record = RegisteredNode {
            node_id: identity.node_id.clone(),
            node_name: identity.node_name.clone(),
            raw_node_type: identity.node_type.as_str().to_string(),
            public_key: identity.public_key.to_hex(),
            is_registered: true,
            registered_by: String::new(),
            node_signature: registration.signature.to_hex(),
            registered_by_node_type: registration.admitting_node_type.as_str().to_string(),
        };
        state.nodes.insert(registration.signature.clone(), record);
        Ok(RegisterOutcome::Registered {
            receipt: Receipt(format!("registered {}", identity.node_id)),
        })
    }

    async fn is_validator(&self, signature: &Signature) -> Result<bool, LedgerError> {
        Ok(self.enter("isValidator")?.validator_flags.contains(signature))
    }

    async fn validator_set(&self) -> Result<ValidatorSet, LedgerError> {
        let mut state = self.enter("getValidatorsByBlockNumber")?;
        let mut admitted = Vec::new();
        state.pending_votes.retain_mut(|(address, remaining)| {
            if *remaining == 0 {
                admitted.push(address.clone());
                false
            } else {
                *remaining -= 1;
                true
            }
        });
        state.validators.extend(admitted);
        Ok(state.validators.clone())
    }

    async fn peer_count(&self) -> Result<u64, LedgerError> {
        let mut state = self.enter("getPeerCount")?;
        if let Some(next) = state.peer_counts.pop_front() {
            state.last_peer_count = next;
        }
        Ok(state.last_peer_count)
    }

    async fn propose_validator_vote(
        &self,
        address: &NodeAddress,
        add: bool,
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.enter("proposeValidatorVote")?;
        state.votes.push((address.clone(), add));
        if add
            && !state.validators.contains(address)
            && !state.pending_votes.iter().any(|(a, _)| a == address)
        {
            let delay = state.convergence_delay;
            state.pending_votes.push((address.clone(), delay));
        }
        if !add {
            state.validators.remove(address);
        }
        Ok(Receipt(format!("vote {address} {add}")))
    }

    async fn emit_validator_proposal(&self, address: &NodeAddress) -> Result<Receipt, LedgerError> {
        let mut state = self.enter("emitValidatorProposalToChain")?;
        state.emitted.push(address.clone());
        Ok(Receipt(address.to_string()))
    }

    async fn observed_proposals(&self) -> Result<Vec<NodeAddress>, LedgerError> {
        let state = self.enter("listenForValidatorProposals")?;
        Ok(state
            .observed
            .iter()
            .chain(state.emitted.iter())
            .cloned()
            .collect())
    }

    async fn issue_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<CapabilityToken, LedgerError> {
        let mut state = self.enter("issueCapabilityToken")?;
        Ok(self.issue(&mut state, from, to))
    }

    async fn revoke_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.enter("revokeCapabilityToken")?;
        if let Some(token) = state.tokens.get_mut(&(from.clone(), to.clone())) {
            token.is_revoked = true;
            token.is_issued = false;
        }
        Ok(Receipt("revoked".into()))
    }

    async fn get_capability_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<Option<CapabilityToken>, LedgerError> {
        let state = self.enter("getCapabilityToken")?;
        Ok(state.tokens.get(&(from.clone(), to.clone())).cloned())
    }

    async fn check_token_expiry(
        &self,
        from: &Signature,
        to: &Signature,
        validity_secs: u64,
    ) -> Result<bool, LedgerError> {
        let state = self.enter("checkTokenExpiry")?;
        let now = self.clock.now();
        Ok(state
            .tokens
            .get(&(from.clone(), to.clone()))
            .map_or(true, |t| t.is_expired(validity_secs, now)))
    }

    async fn check_token_availability(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<bool, LedgerError> {
        let state = self.enter("checkCapabilityToken")?;
        Ok(state
            .tokens
            .get(&(from.clone(), to.clone()))
            .is_some_and(CapabilityToken::is_live))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> NodeAddress {
        NodeAddress::from_bytes(&[b; 20])
    }

    #[tokio::test]
    async fn peer_counts_replay_then_repeat() {
        let ledger = NullLedger::new();
        ledger.script_peer_counts([1, 1, 2]);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(ledger.peer_count().await.unwrap());
        }
        assert_eq!(seen, vec![1, 1, 2, 2, 2]);
    }

    #[tokio::test]
    async fn vote_converges_after_configured_polls() {
        let ledger = NullLedger::new();
        ledger.converge_after(2);
        ledger.propose_validator_vote(&addr(9), true).await.unwrap();
        assert!(!ledger.validator_set().await.unwrap().contains(&addr(9)));
        assert!(!ledger.validator_set().await.unwrap().contains(&addr(9)));
        assert!(ledger.validator_set().await.unwrap().contains(&addr(9)));
    }

    #[tokio::test]
    async fn injected_failure_is_external_error() {
        let ledger = NullLedger::new();
        ledger.fail_call("getPeerCount", "Error in response");
        assert!(matches!(
            ledger.peer_count().await,
            Err(LedgerError::External { call: "getPeerCount", .. })
        ));
        ledger.clear_failure("getPeerCount");
        assert_eq!(ledger.peer_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tokens_expire_on_clock() {
        let ledger = NullLedger::new();
        let (a, b) = (Signature([1; 64]), Signature([2; 64]));
        assert!(!ledger.check_token_availability(&a, &b).await.unwrap());
        ledger.issue_capability_token(&a, &b).await.unwrap();
        assert!(ledger.check_token_availability(&a, &b).await.unwrap());
        assert!(!ledger.check_token_expiry(&a, &b, 60).await.unwrap());
        ledger.clock().advance(60);
        assert!(ledger.check_token_expiry(&a, &b, 60).await.unwrap());
    }
}
