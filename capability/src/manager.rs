//! Capability token lifecycle and authorization.

use std::sync::Arc;

use meshgate_ledger::LedgerClient;
use meshgate_types::{Action, CapabilityToken, Signature};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{CapabilityError, Policy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allowed,
    Denied,
}

/// What happened to the pair's token while authorizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenEvent {
    /// No live token existed; one was issued.
    Issued,
    /// The token had expired; it was revoked and a new one issued.
    Reissued,
    /// The existing token was still valid.
    Reused,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Authorization {
    pub decision: Decision,
    pub action: Action,
    pub policy: Policy,
    pub token: TokenEvent,
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allowed
    }
}

/// Issues, renews and evaluates capability tokens held on the ledger.
///
/// Nothing is cached: every authorization is a live round trip, so a token
/// revoked on the ledger stops authorizing immediately.
#[derive(Clone)]
pub struct TokenManager {
    ledger: Arc<dyn LedgerClient>,
    validity_secs: u64,
}

impl TokenManager {
    pub fn new(ledger: Arc<dyn LedgerClient>, validity_secs: u64) -> Self {
        Self {
            ledger,
            validity_secs,
        }
    }

    pub fn validity_secs(&self) -> u64 {
        self.validity_secs
    }

    /// Ensure a live token for `(from, to)` exists, then check `action` against its policy.
    pub async fn authorize(
        &self,
        from: &Signature,
        to: &Signature,
        action: Action,
    ) -> Result<Authorization, CapabilityError> {
        let (token, event) = self.ensure_token(from, to).await?;
        let raw = token.policy.as_deref().unwrap_or_default();
        let policy = Policy::parse(raw)?;
        let decision = if policy.permits(action) {
            Decision::Allowed
        } else {
            Decision::Denied
        };
        debug!(
            from = %from.short(),
            to = %to.short(),
            %action,
            %policy,
            ?decision,
            "capability evaluated"
        );
        Ok(Authorization {
            decision,
            action,
            policy,
            token: event,
        })
    }

    async fn ensure_token(
        &self,
        from: &Signature,
        to: &Signature,
    ) -> Result<(CapabilityToken, TokenEvent), CapabilityError> {
        if !self.ledger.check_token_availability(from, to).await? {
            let token = self.ledger.issue_capability_token(from, to).await?;
            info!(from = %from.short(), to = %to.short(), "capability token issued");
            return Ok((token, TokenEvent::Issued));
        }

        if self
            .ledger
            .check_token_expiry(from, to, self.validity_secs)
            .await?
        {
            self.ledger.revoke_capability_token(from, to).await?;
            let token = self.ledger.issue_capability_token(from, to).await?;
            info!(from = %from.short(), to = %to.short(), "expired capability token reissued");
            return Ok((token, TokenEvent::Reissued));
        }

        let token = self
            .ledger
            .get_capability_token(from, to)
            .await?
            .ok_or(CapabilityError::TokenMissing)?;
        Ok((token, TokenEvent::Reused))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgate_nullables::NullLedger;

    const VALIDITY: u64 = 360_000;

    fn pair() -> (Signature, Signature) {
        (Signature([0xc; 64]), Signature([0xa; 64]))
    }

    fn manager(ledger: &Arc<NullLedger>) -> TokenManager {
        TokenManager::new(ledger.clone(), VALIDITY)
    }

    #[tokio::test]
    async fn first_use_issues_then_reuses() {
        let ledger = Arc::new(NullLedger::new());
        let tokens = manager(&ledger);
        let (from, to) = pair();

        let first = tokens.authorize(&from, &to, Action::Read).await.unwrap();
        assert_eq!(first.token, TokenEvent::Issued);
        assert!(first.is_allowed());

        ledger.clock().advance(VALIDITY - 1);
        let second = tokens.authorize(&from, &to, Action::Read).await.unwrap();
        assert_eq!(second.token, TokenEvent::Reused);
        assert_eq!(ledger.call_count("issueCapabilityToken"), 1);
        assert_eq!(ledger.call_count("revokeCapabilityToken"), 0);
    }

    #[tokio::test]
    async fn expired_token_is_revoked_and_reissued() {
        let ledger = Arc::new(NullLedger::new());
        let tokens = manager(&ledger);
        let (from, to) = pair();

        tokens.authorize(&from, &to, Action::Read).await.unwrap();
        let issued_at = ledger.token(&from, &to).unwrap().issued_at;

        ledger.clock().advance(VALIDITY);
        let renewed = tokens.authorize(&from, &to, Action::Read).await.unwrap();
        assert_eq!(renewed.token, TokenEvent::Reissued);
        assert_eq!(ledger.call_count("revokeCapabilityToken"), 1);
        assert_eq!(ledger.call_count("issueCapabilityToken"), 2);
        assert!(ledger.token(&from, &to).unwrap().issued_at > issued_at);

        let calls = ledger.calls();
        let revoke = calls.iter().rposition(|c| *c == "revokeCapabilityToken").unwrap();
        let issue = calls.iter().rposition(|c| *c == "issueCapabilityToken").unwrap();
        assert!(revoke < issue);
    }

    #[tokio::test]
    async fn read_only_policy_denies_other_actions() {
        let ledger = Arc::new(NullLedger::new());
        ledger.set_policy("default:READ");
        let tokens = manager(&ledger);
        let (from, to) = pair();

        for action in Action::ALL {
            let auth = tokens.authorize(&from, &to, action).await.unwrap();
            let expected = if action == Action::Read {
                Decision::Allowed
            } else {
                Decision::Denied
            };
            assert_eq!(auth.decision, expected, "{action}");
        }
    }

    #[tokio::test]
    async fn malformed_policy_is_an_error_not_a_denial() {
        let ledger = Arc::new(NullLedger::new());
        ledger.set_policy("READ,WRITE");
        let (from, to) = pair();
        let err = manager(&ledger)
            .authorize(&from, &to, Action::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::PolicyParse { raw } if raw == "READ,WRITE"));
    }

    #[tokio::test]
    async fn absent_policy_is_an_error() {
        let ledger = Arc::new(NullLedger::new());
        ledger.set_policy("");
        let (from, to) = pair();
        let err = manager(&ledger)
            .authorize(&from, &to, Action::Write)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::PolicyParse { .. }));
    }

    #[tokio::test]
    async fn tokens_are_per_ordered_pair() {
        let ledger = Arc::new(NullLedger::new());
        let tokens = manager(&ledger);
        let (a, b) = pair();
        tokens.authorize(&a, &b, Action::Read).await.unwrap();
        let reverse = tokens.authorize(&b, &a, Action::Read).await.unwrap();
        assert_eq!(reverse.token, TokenEvent::Issued);
    }

    #[tokio::test]
    async fn ledger_failure_propagates() {
        let ledger = Arc::new(NullLedger::new());
        ledger.fail_call("checkCapabilityToken", "Error checking token");
        let (from, to) = pair();
        let err = manager(&ledger)
            .authorize(&from, &to, Action::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Ledger(_)));
    }
}
