//! Transports that carry a [`LedgerCommand`] to the ledger and return its reply.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{LedgerCommand, LedgerError};

/// Executes one ledger command and returns its trimmed textual reply.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn call(&self, command: &LedgerCommand) -> Result<String, LedgerError>;
}

/// Runs the ledger command script as a child process per call:
/// `<program> <script> <call-name> <args...>`.
#[derive(Clone, Debug)]
pub struct ProcessTransport {
    program: PathBuf,
    script: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessTransport {
    pub fn new(program: impl Into<PathBuf>, script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            working_dir: None,
            timeout,
        }
    }

    /// Run the script from `dir` (the script resolves its artifacts relative to it).
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandTransport for ProcessTransport {
    async fn call(&self, command: &LedgerCommand) -> Result<String, LedgerError> {
        let call = command.name();
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg(&self.script)
            .arg(call)
            .args(command.args())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| LedgerError::Process { call, source })?,
            Err(_) => {
                warn!(call, timeout = ?self.timeout, "ledger call timed out");
                return Err(LedgerError::Timeout {
                    call,
                    timeout: self.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(LedgerError::NonZeroExit {
                call,
                status: output.status.code(),
                stderr,
                stdout,
            });
        }
        debug!(call, reply = %stdout, "ledger reply");
        Ok(stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use meshgate_types::Signature;
    use std::io::Write;

    fn fake_script() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"case "$1" in
  isValidator) echo "  true  " ;;
  getPeerCount) echo "rpc down" >&2; exit 3 ;;
  checkIfDeployed) sleep 5 ;;
  checkTokenExpiry) echo "$2 $3 $4" ;;
esac"#
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn reply_is_trimmed_stdout() {
        let script = fake_script();
        let transport = ProcessTransport::new("sh", script.path(), Duration::from_secs(5));
        let reply = transport
            .call(&LedgerCommand::IsValidator {
                signature: Signature([0; 64]),
            })
            .await
            .unwrap();
        assert_eq!(reply, "true");
    }

    #[tokio::test]
    async fn arguments_are_positional() {
        let script = fake_script();
        let transport = ProcessTransport::new("sh", script.path(), Duration::from_secs(5));
        let reply = transport
            .call(&LedgerCommand::CheckTokenExpiry {
                from: Signature([0x11; 64]),
                to: Signature([0x22; 64]),
                validity_secs: 30,
            })
            .await
            .unwrap();
        let parts: Vec<&str> = reply.split(' ').collect();
        assert_eq!(parts[0], format!("0x{}", "11".repeat(64)));
        assert_eq!(parts[1], format!("0x{}", "22".repeat(64)));
        assert_eq!(parts[2], "30");
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let script = fake_script();
        let transport = ProcessTransport::new("sh", script.path(), Duration::from_secs(5));
        let err = transport.call(&LedgerCommand::GetPeerCount).await.unwrap_err();
        match err {
            LedgerError::NonZeroExit {
                call,
                status,
                stderr,
                ..
            } => {
                assert_eq!(call, "getPeerCount");
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "rpc down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let script = fake_script();
        let transport = ProcessTransport::new("sh", script.path(), Duration::from_millis(100));
        let err = transport.call(&LedgerCommand::CheckIfDeployed).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { call: "checkIfDeployed", .. }));
    }

    #[tokio::test]
    async fn missing_program_is_process_error() {
        let transport = ProcessTransport::new(
            "/nonexistent/ledger-runtime",
            "interact.js",
            Duration::from_secs(1),
        );
        let err = transport.call(&LedgerCommand::GetPeerCount).await.unwrap_err();
        assert!(matches!(err, LedgerError::Process { .. }));
    }
}
