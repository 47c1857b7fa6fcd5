//! Capability-token access control.
//!
//! [`TokenManager`] keeps a live token for an ordered `(from, to)` pair on the
//! ledger (issuing on first use, reissuing once expired) and evaluates its
//! policy line. [`PolicyEnforcementPoint`] is the single check every action
//! endpoint runs before doing anything on a requester's behalf.

pub mod enforcement;
pub mod error;
pub mod manager;
pub mod policy;

pub use enforcement::{Enforcement, PolicyEnforcementPoint};
pub use error::CapabilityError;
pub use manager::{Authorization, Decision, TokenEvent, TokenManager};
pub use policy::Policy;
