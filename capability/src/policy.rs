//! Capability policy lines: `flow:PERM1,PERM2,...`.

use std::fmt;

use meshgate_types::{Action, PermissionSet};
use serde::Serialize;
use tracing::warn;

use crate::CapabilityError;

/// Label some ledger builds put in front of the policy line. Only stripped
/// when a full `flow:` line follows it.
const POLICY_LABEL: &str = "Policy";

/// A parsed capability policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub flow: String,
    #[serde(serialize_with = "serialize_permissions")]
    pub permissions: PermissionSet,
}

fn serialize_permissions<S: serde::Serializer>(
    permissions: &PermissionSet,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(permissions.iter().map(|a| a.as_str()))
}

impl Policy {
    /// Parse a policy line.
    ///
    /// The flow is everything before the first `:`; permissions are matched
    /// by exact name and unknown names are skipped. A line without a `:` or
    /// with an empty flow is rejected. `Policy: flow:PERMS` is read as the
    /// labelled form of `flow:PERMS`, while `Policy:PERMS` is an ordinary line
    /// whose flow is `Policy`.
    pub fn parse(raw: &str) -> Result<Self, CapabilityError> {
        let malformed = || CapabilityError::PolicyParse {
            raw: raw.to_string(),
        };
        let (mut flow, mut perms) = raw.trim().split_once(':').ok_or_else(malformed)?;
        if flow.trim() == POLICY_LABEL {
            if let Some((inner_flow, inner_perms)) = perms.split_once(':') {
                (flow, perms) = (inner_flow, inner_perms);
            }
        }
        let flow = flow.trim();
        if flow.is_empty() {
            return Err(malformed());
        }

        let mut permissions = PermissionSet::EMPTY;
        for name in perms.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match Action::ALL.iter().find(|a| a.as_str() == name) {
                Some(action) => permissions.insert(*action),
                None => warn!(flow, permission = name, "ignoring unknown permission"),
            }
        }
        Ok(Self {
            flow: flow.to_string(),
            permissions,
        })
    }

    pub fn permits(&self, action: Action) -> bool {
        self.permissions.contains(action)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.flow, self.permissions)
    }
}
