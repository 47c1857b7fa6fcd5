//! Capability actions, permission sets and the ledger's token record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Signature, Timestamp, TypesError};

/// An interaction kind guarded by a capability token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Read,
    Write,
    Execute,
    Transmit,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Read,
        Action::Write,
        Action::Execute,
        Action::Transmit,
    ];

    /// Wire name used in policy lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "READ",
            Action::Write => "WRITE",
            Action::Execute => "EXECUTE",
            Action::Transmit => "TRANSMIT",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Action::Read => 1,
            Action::Write => 1 << 1,
            Action::Execute => 1 << 2,
            Action::Transmit => 1 << 3,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(Action::Read),
            "WRITE" => Ok(Action::Write),
            "EXECUTE" => Ok(Action::Execute),
            "TRANSMIT" => Ok(Action::Transmit),
            _ => Err(TypesError::UnknownAction(s.to_string())),
        }
    }
}

/// A subset of [`Action::ALL`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet(u8);

impl PermissionSet {
    pub const EMPTY: Self = Self(0);

    pub fn insert(&mut self, action: Action) {
        self.0 |= action.bit();
    }

    pub fn contains(&self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        Action::ALL.into_iter().filter(|a| self.contains(*a))
    }
}

impl FromIterator<Action> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for action in iter {
            set.insert(action);
        }
        set
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|a| a.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// A capability token as recorded by the ledger for an ordered `(from, to)` pair.
///
/// The policy line is kept raw; interpreting it is the token manager's job so
/// a malformed line surfaces as an error at authorization time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub from: Signature,
    pub to: Signature,
    pub policy: Option<String>,
    pub issued_at: Timestamp,
    pub is_issued: bool,
    pub is_revoked: bool,
}

impl CapabilityToken {
    /// Whether `validity_secs` have elapsed since issuance, as of `now`.
    pub fn is_expired(&self, validity_secs: u64, now: Timestamp) -> bool {
        self.issued_at.has_expired(validity_secs, now)
    }

    /// A token is live when it was issued and not revoked since.
    pub fn is_live(&self) -> bool {
        self.is_issued && !self.is_revoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parse_is_case_insensitive() {
        assert_eq!("read".parse::<Action>().unwrap(), Action::Read);
        assert_eq!(" Transmit ".parse::<Action>().unwrap(), Action::Transmit);
        assert!("DELETE".parse::<Action>().is_err());
    }

    #[test]
    fn permission_set_membership() {
        let set: PermissionSet = [Action::Read, Action::Write].into_iter().collect();
        assert!(set.contains(Action::Read));
        assert!(set.contains(Action::Write));
        assert!(!set.contains(Action::Execute));
        assert!(!set.contains(Action::Transmit));
        assert_eq!(set.to_string(), "READ,WRITE");
    }

    #[test]
    fn empty_set_contains_nothing() {
        let set = PermissionSet::EMPTY;
        assert!(set.is_empty());
        assert!(Action::ALL.iter().all(|a| !set.contains(*a)));
    }

    #[test]
    fn token_expiry_relative_to_issue_time() {
        let token = CapabilityToken {
            from: Signature([1; 64]),
            to: Signature([2; 64]),
            policy: Some("default:READ".into()),
            issued_at: Timestamp::new(100),
            is_issued: true,
            is_revoked: false,
        };
        assert!(!token.is_expired(50, Timestamp::new(149)));
        assert!(token.is_expired(50, Timestamp::new(150)));
        assert!(token.is_live());
    }
}
