//! Bounded, cancellable polling with exponential backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use meshgate_ledger::LedgerError;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::AdmissionError;

/// Which admission wait a poll belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Waiting for the candidate to connect to the ledger network.
    PeerConnectivity,
    /// Waiting for the validator set to include the candidate.
    Convergence,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PeerConnectivity => "peer_connectivity",
            Stage::Convergence => "convergence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_max_interval_secs() -> u64 {
    60
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_deadline_secs() -> u64 {
    600
}

/// Backoff schedule and overall deadline for one kind of wait.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub initial_interval_secs: u64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl PollPolicy {
    /// Peer connectivity wait: first re-check after 5s.
    pub fn peer_wait() -> Self {
        Self::starting_at(5)
    }

    /// Validator set convergence wait: first re-check after 7s.
    pub fn convergence_wait() -> Self {
        Self::starting_at(7)
    }

    fn starting_at(initial_interval_secs: u64) -> Self {
        Self {
            initial_interval_secs,
            max_interval_secs: default_max_interval_secs(),
            multiplier: default_multiplier(),
            deadline_secs: default_deadline_secs(),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_secs(self.initial_interval_secs.max(1))
    }

    /// Interval following `current`, capped at the maximum.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let max = Duration::from_secs(self.max_interval_secs.max(1));
        let factor = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        current.mul_f64(factor).min(max)
    }
}

/// A successful poll: the probe's value and how long it took to get it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Polled<T> {
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Call `probe` until it yields `Some`, sleeping between attempts per `policy`.
///
/// Probe errors are logged and retried; they still count against the
/// deadline. Returns [`AdmissionError::ConvergenceTimeout`] once the deadline
/// has passed and [`AdmissionError::Cancelled`] as soon as `cancel` fires.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    stage: Stage,
    mut probe: F,
) -> Result<Polled<T>, AdmissionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, LedgerError>>,
{
    let started = Instant::now();
    let deadline = started + policy.deadline();
    let mut interval = policy.initial_interval();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(AdmissionError::Cancelled { stage });
        }
        attempts += 1;
        match probe().await {
            Ok(Some(value)) => {
                return Ok(Polled {
                    value,
                    attempts,
                    elapsed: started.elapsed(),
                })
            }
            Ok(None) => debug!(%stage, attempts, "condition not met yet"),
            Err(e) => warn!(%stage, attempts, error = %e, "probe failed; retrying"),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(AdmissionError::ConvergenceTimeout {
                stage,
                waited: now - started,
            });
        }
        let sleep_for = interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AdmissionError::Cancelled { stage }),
            _ = tokio::time::sleep(sleep_for) => {}
        }
        interval = policy.next_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(initial: u64, max: u64, deadline: u64) -> PollPolicy {
        PollPolicy {
            initial_interval_secs: initial,
            max_interval_secs: max,
            multiplier: 2.0,
            deadline_secs: deadline,
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let p = policy(5, 30, 600);
        let mut i = p.initial_interval();
        let mut seen = vec![i.as_secs()];
        for _ in 0..4 {
            i = p.next_interval(i);
            seen.push(i.as_secs());
        }
        assert_eq!(seen, vec![5, 10, 20, 30, 30]);
    }

    #[test]
    fn nonsensical_multiplier_means_fixed_interval() {
        let mut p = policy(5, 60, 600);
        p.multiplier = 0.1;
        assert_eq!(p.next_interval(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_condition_holds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out = poll_until(&policy(5, 60, 600), &CancellationToken::new(), Stage::Convergence, move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, LedgerError>((n == 3).then_some(n)) }
        })
        .await
        .unwrap();
        assert_eq!(out.value, 3);
        assert_eq!(out.attempts, 3);
        // 5s + 10s of backoff before the third attempt.
        assert_eq!(out.elapsed, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_yields_timeout() {
        let err = poll_until(&policy(5, 60, 20), &CancellationToken::new(), Stage::PeerConnectivity, || async {
            Ok::<Option<()>, LedgerError>(None)
        })
        .await
        .unwrap_err();
        match err {
            AdmissionError::ConvergenceTimeout { stage, waited } => {
                assert_eq!(stage, Stage::PeerConnectivity);
                assert_eq!(waited, Duration::from_secs(20));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out = poll_until(&policy(1, 1, 60), &CancellationToken::new(), Stage::Convergence, move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(LedgerError::Rpc("connection refused".into()))
                } else {
                    Ok(Some(()))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let err = poll_until(&policy(60, 60, 600), &cancel, Stage::Convergence, || async {
            Ok::<Option<()>, LedgerError>(None)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AdmissionError::Cancelled { stage: Stage::Convergence }));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
