//! Background task through which an existing validator votes for new ones.
//!
//! The listener runs for the whole life of the node. The local identity comes
//! from the peer record, which may only appear once the node has registered
//! itself, so every tick re-resolves it instead of capturing it at startup.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use meshgate_ledger::LedgerClient;
use meshgate_store::PeerRecord;
use meshgate_types::NodeAddress;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::AdmissionError;

/// Why the listener stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerExit {
    /// The local node was a validator and has been removed from the set.
    Demoted,
    Shutdown,
}

/// Result of a single listener pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerTick {
    /// No peer record yet.
    Unregistered,
    /// Registered, but not a validator (yet).
    Standby,
    /// Validator; `votes` is the number of votes cast on this pass.
    Voting { votes: usize },
    /// Was a validator on an earlier pass and no longer is.
    Demoted,
}

type VoteHook = Arc<dyn Fn(&NodeAddress) + Send + Sync>;

/// On every tick, if this node is a validator: read proposal events, drop
/// addresses already in the validator set, and vote to add the rest.
pub struct ProposalListener {
    ledger: Arc<dyn LedgerClient>,
    peer: PeerRecord,
    interval: Duration,
    was_validator: bool,
    voted: HashSet<NodeAddress>,
    on_vote: Option<VoteHook>,
}

impl ProposalListener {
    pub fn new(ledger: Arc<dyn LedgerClient>, peer: PeerRecord, interval: Duration) -> Self {
        Self {
            ledger,
            peer,
            interval,
            was_validator: false,
            voted: HashSet::new(),
            on_vote: None,
        }
    }

    /// Called once for every vote the listener casts.
    pub fn on_vote(mut self, hook: impl Fn(&NodeAddress) + Send + Sync + 'static) -> Self {
        self.on_vote = Some(Arc::new(hook));
        self
    }

    /// Run until the node is demoted from the validator set or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> ListenerExit {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "proposal listener started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("proposal listener shutting down");
                    return ListenerExit::Shutdown;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(ListenerTick::Demoted) => {
                            info!("local node left the validator set; proposal listener exiting");
                            return ListenerExit::Demoted;
                        }
                        Ok(tick) => debug!(?tick, "proposal listener tick"),
                        Err(e) => warn!(error = %e, "proposal listener tick failed; skipping"),
                    }
                }
            }
        }
    }

    /// One listener pass.
    pub async fn tick(&mut self) -> Result<ListenerTick, AdmissionError> {
        let Some(local) = self.peer.current().await? else {
            return Ok(ListenerTick::Unregistered);
        };
        if !self.ledger.is_validator(&local.signature).await? {
            return Ok(if self.was_validator {
                ListenerTick::Demoted
            } else {
                ListenerTick::Standby
            });
        }
        if !self.was_validator {
            info!(node_id = %local.identity.node_id, "local node is a validator; voting on proposals");
            self.was_validator = true;
        }

        let proposals = self.ledger.observed_proposals().await?;
        if proposals.is_empty() {
            return Ok(ListenerTick::Voting { votes: 0 });
        }
        let validators = self.ledger.validator_set().await?;

        let mut votes = 0;
        for address in proposals {
            if validators.contains(&address) || self.voted.contains(&address) {
                continue;
            }
            self.ledger.propose_validator_vote(&address, true).await?;
            debug!(%address, "voted to admit proposed validator");
            if let Some(hook) = &self.on_vote {
                hook(&address);
            }
            self.voted.insert(address);
            votes += 1;
        }
        Ok(ListenerTick::Voting { votes })
    }
}
