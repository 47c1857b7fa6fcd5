//! Connectivity-gated admission of a new validator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use meshgate_ledger::LedgerClient;
use meshgate_types::{NodeAddress, Timestamp};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{poll_until, AdmissionError, PollPolicy, Stage};

/// A candidate whose admission wait is in progress in this process.
///
/// Held in memory only; a restart drops it and the registration must be retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingValidatorProposal {
    pub candidate: NodeAddress,
    pub observed_at: Timestamp,
}

/// How an admission went, for the registration response and logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionReport {
    pub candidate: NodeAddress,
    pub initial_peers: u64,
    pub observed_peers: u64,
    pub peer_attempts: u32,
    pub convergence_attempts: u32,
    pub elapsed: Duration,
}

type PendingSet = Arc<Mutex<HashMap<NodeAddress, PendingValidatorProposal>>>;

/// Removes a candidate from the pending set when its wait ends, however it ends.
struct PendingGuard {
    pending: PendingSet,
    candidate: NodeAddress,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.candidate);
    }
}

fn lock(pending: &PendingSet) -> MutexGuard<'_, HashMap<NodeAddress, PendingValidatorProposal>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Clone)]
pub struct ValidatorAdmissionController {
    ledger: Arc<dyn LedgerClient>,
    peer_wait: PollPolicy,
    convergence_wait: PollPolicy,
    pending: PendingSet,
}

impl ValidatorAdmissionController {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        peer_wait: PollPolicy,
        convergence_wait: PollPolicy,
    ) -> Self {
        Self {
            ledger,
            peer_wait,
            convergence_wait,
            pending: PendingSet::default(),
        }
    }

    /// Candidates currently waiting for admission.
    pub fn pending(&self) -> Vec<PendingValidatorProposal> {
        lock(&self.pending).values().cloned().collect()
    }

    /// Run the admission protocol for `candidate`.
    ///
    /// 1. Record the current peer count.
    /// 2. Wait until the peer count exceeds it (the candidate has connected).
    /// 3. Emit a proposal event and cast this node's affirmative vote.
    /// 4. Wait until the ledger's validator set contains the candidate.
    pub async fn admit(
        &self,
        candidate: &NodeAddress,
        cancel: &CancellationToken,
    ) -> Result<AdmissionReport, AdmissionError> {
        let _guard = self.claim(candidate)?;
        let started = Instant::now();

        let initial_peers = self.ledger.peer_count().await?;
        info!(%candidate, initial_peers, "waiting for candidate to join the network");

        let ledger = self.ledger.clone();
        let peers = poll_until(&self.peer_wait, cancel, Stage::PeerConnectivity, || {
            let ledger = ledger.clone();
            async move {
                let count = ledger.peer_count().await?;
                Ok((count > initial_peers).then_some(count))
            }
        })
        .await?;
        info!(%candidate, peers = peers.value, attempts = peers.attempts, "candidate connected; proposing");

        self.ledger.emit_validator_proposal(candidate).await?;
        self.ledger.propose_validator_vote(candidate, true).await?;

        let convergence = poll_until(&self.convergence_wait, cancel, Stage::Convergence, || {
            let ledger = ledger.clone();
            let candidate = candidate.clone();
            async move {
                let set = ledger.validator_set().await?;
                Ok(set.contains(&candidate).then_some(()))
            }
        })
        .await?;

        let report = AdmissionReport {
            candidate: candidate.clone(),
            initial_peers,
            observed_peers: peers.value,
            peer_attempts: peers.attempts,
            convergence_attempts: convergence.attempts,
            elapsed: started.elapsed(),
        };
        info!(%candidate, elapsed = ?report.elapsed, "validator set converged");
        Ok(report)
    }

    fn claim(&self, candidate: &NodeAddress) -> Result<PendingGuard, AdmissionError> {
        let mut pending = lock(&self.pending);
        if pending.contains_key(candidate) {
            return Err(AdmissionError::AlreadyPending {
                candidate: candidate.clone(),
            });
        }
        pending.insert(
            candidate.clone(),
            PendingValidatorProposal {
                candidate: candidate.clone(),
                observed_at: Timestamp::now(),
            },
        );
        Ok(PendingGuard {
            pending: self.pending.clone(),
            candidate: candidate.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgate_nullables::NullLedger;

    fn policy(initial: u64, deadline: u64) -> PollPolicy {
        PollPolicy {
            initial_interval_secs: initial,
            max_interval_secs: initial,
            multiplier: 1.0,
            deadline_secs: deadline,
        }
    }

    fn controller(ledger: &Arc<NullLedger>) -> ValidatorAdmissionController {
        ValidatorAdmissionController::new(ledger.clone(), policy(5, 120), policy(7, 120))
    }

    fn candidate() -> NodeAddress {
        NodeAddress::from_bytes(&[0xb; 20])
    }

    #[tokio::test(start_paused = true)]
    async fn proposal_waits_for_peer_increase() {
        let ledger = Arc::new(NullLedger::new());
        ledger.script_peer_counts([3, 3, 3, 4]);
        ledger.converge_after(1);

        let report = controller(&ledger)
            .admit(&candidate(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.initial_peers, 3);
        assert_eq!(report.observed_peers, 4);
        assert_eq!(report.peer_attempts, 3);

        let calls = ledger.calls();
        let last_peer_poll = calls.iter().rposition(|c| *c == "getPeerCount").unwrap();
        let emit = calls
            .iter()
            .position(|c| *c == "emitValidatorProposalToChain")
            .unwrap();
        let vote = calls.iter().position(|c| *c == "proposeValidatorVote").unwrap();
        assert!(last_peer_poll < emit);
        assert!(emit < vote);
        assert_eq!(ledger.votes(), vec![(candidate(), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn consensus_only_after_validator_set_contains_candidate() {
        let ledger = Arc::new(NullLedger::new());
        ledger.script_peer_counts([1, 2]);
        ledger.converge_after(3);

        let report = controller(&ledger)
            .admit(&candidate(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.convergence_attempts, 4);
        assert_eq!(ledger.call_count("getValidatorsByBlockNumber"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_wait_times_out_without_proposing() {
        let ledger = Arc::new(NullLedger::new());
        ledger.script_peer_counts([2]);

        let err = ValidatorAdmissionController::new(ledger.clone(), policy(5, 30), policy(7, 30))
            .admit(&candidate(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::ConvergenceTimeout {
                stage: Stage::PeerConnectivity,
                ..
            }
        ));
        assert!(ledger.emitted_proposals().is_empty());
        assert!(ledger.votes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn convergence_timeout_reported() {
        let ledger = Arc::new(NullLedger::new());
        ledger.script_peer_counts([0, 1]);
        ledger.converge_after(usize::MAX);

        let err = ValidatorAdmissionController::new(ledger.clone(), policy(5, 30), policy(7, 30))
            .admit(&candidate(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::ConvergenceTimeout {
                stage: Stage::Convergence,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_admission_of_same_candidate_rejected() {
        let ledger = Arc::new(NullLedger::new());
        ledger.script_peer_counts([0]);
        let controller = controller(&ledger);
        let cancel = CancellationToken::new();

        let first = {
            let controller = controller.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { controller.admit(&candidate(), &cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.pending().len(), 1);

        let err = controller
            .admit(&candidate(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::AlreadyPending { .. }));

        cancel.cancel();
        let first = first.await.unwrap();
        assert!(matches!(first, Err(AdmissionError::Cancelled { .. })));
        assert!(controller.pending().is_empty());
    }
}
