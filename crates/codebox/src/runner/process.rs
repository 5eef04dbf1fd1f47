//! Subprocess spawning and output capture
//!
//! Output is collected as a whole when the process exits; nothing is streamed.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::runner::ExecuteError;
use crate::types::ExecutionResult;

/// Exit code of a finished process, or the negated signal number
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

/// Run `command` to completion, killing it once `timeout` expires.
///
/// A timeout is not an error: it yields [`ExecutionResult::timeout`]. Kill
/// failures (the process may already be gone) are logged and ignored.
#[instrument(skip(command), fields(program = ?command.as_std().get_program()))]
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<ExecutionResult, ExecuteError> {
    let program = command.as_std().get_program().into();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecuteError::Spawn { program, source })?;

    let mut stdout = child.stdout.take().ok_or(ExecuteError::MissingPipe("stdout"))?;
    let mut stderr = child.stderr.take().ok_or(ExecuteError::MissingPipe("stderr"))?;

    let outcome = tokio::time::timeout(timeout, async {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let (status, read_out, read_err) = tokio::join!(
            child.wait(),
            stdout.read_to_end(&mut out),
            stderr.read_to_end(&mut err),
        );
        read_out?;
        read_err?;
        Ok::<_, std::io::Error>((status?, out, err))
    })
    .await;

    match outcome {
        Ok(result) => {
            let (status, out, err) = result?;
            let result = ExecutionResult {
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
                exit_code: exit_code(status),
                timed_out: false,
            };
            debug!(exit_code = result.exit_code, "process finished");
            Ok(result)
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed out process");
            }
            debug!(?timeout, "process timed out");
            Ok(ExecutionResult::timeout())
        }
    }
}
