//! Nullable infrastructure for deterministic testing.
//!
//! The ledger is the one external system every meshgate component talks to.
//! This crate provides a test-friendly stand-in that:
//! - Keeps all state in memory and never spawns processes
//! - Can be scripted (peer counts, convergence delay, injected failures)
//! - Records every call for ordering assertions
//!
//! Usage: hand an `Arc<NullLedger>` wherever an `Arc<dyn LedgerClient>` is expected.

pub mod clock;
pub mod ledger;

pub use clock::NullClock;
pub use ledger::NullLedger;
