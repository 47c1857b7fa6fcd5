//! Log output setup for `meshgate node run`.
//!
//! `RUST_LOG`, when set, wins over the configured `log_level`. The level
//! string takes full filter directives, e.g. `"info,meshgate_admission=debug"`
//! to follow a single admission wait.

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::NodeError;

/// `human` for terminals, `json` for log shippers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

fn filter(level: &str) -> Result<EnvFilter, NodeError> {
    match EnvFilter::try_from_default_env() {
        Ok(from_env) => Ok(from_env),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| NodeError::Config(format!("invalid log level {level:?}: {e}"))),
    }
}

/// Install the process-wide subscriber.
///
/// Fails on a malformed `level` or if a subscriber is already installed.
pub fn init_logging(format: LogFormat, level: &str) -> Result<(), NodeError> {
    let filter = filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Human => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
    };
    installed.map_err(|e| NodeError::Config(format!("logging already initialised: {e}")))
}
