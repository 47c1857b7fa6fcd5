//! Node registration and validator admission.
//!
//! - [`RegistrationCoordinator`]: the per-request state machine that verifies a
//!   signed identity, registers it on the ledger, updates the local registry and
//!   pushes the bootstrap acknowledgement.
//! - [`ValidatorAdmissionController`]: the connectivity-gated proposal and
//!   convergence wait for validator-flagged nodes.
//! - [`ProposalListener`]: the background task through which existing
//!   validators vote for newly proposed ones.
//!
//! Every wait is bounded by a [`PollPolicy`] deadline and observes a
//! cancellation token.

pub mod bootstrap;
pub mod coordinator;
pub mod error;
pub mod listener;
pub mod poll;
pub mod validator;

pub use bootstrap::{BootstrapDispatcher, RecordingDispatcher};
pub use coordinator::{RegistrationCoordinator, RegistrationOutcome, RegistrationRequest};
pub use error::AdmissionError;
pub use listener::{ListenerExit, ListenerTick, ProposalListener};
pub use poll::{poll_until, PollPolicy, Polled, Stage};
pub use validator::{AdmissionReport, PendingValidatorProposal, ValidatorAdmissionController};
