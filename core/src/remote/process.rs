// conveyor/src/remote/process.rs

//! Runs an external process to completion under a deadline and captures its output.

use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{event, Level};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
  pub stdout: String,
  pub stderr: String,
  /// `None` when the process was terminated by a signal.
  pub exit_code: Option<i32>,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }

  /// Last non-empty stderr line, or stdout's when stderr is silent.
  pub fn last_line(&self) -> String {
    let pick = |s: &str| s.lines().rev().find(|l| !l.trim().is_empty()).map(|l| l.trim().to_string());
    pick(&self.stderr).or_else(|| pick(&self.stdout)).unwrap_or_default()
  }
}

#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("'{program}' did not finish within {timeout:?}")]
  Timeout { program: String, timeout: Duration },
}

/// Runs `cmd`, killing it if it outlives `timeout`.
pub async fn run(mut cmd: Command, timeout: Duration) -> Result<ProcessOutput, ProcessError> {
  let program = cmd.as_std().get_program().to_string_lossy().into_owned();
  cmd.stdin(std::process::Stdio::null()).kill_on_drop(true);

  event!(Level::DEBUG, %program, ?timeout, "Spawning process.");
  let output = match tokio::time::timeout(timeout, cmd.output()).await {
    Ok(Ok(output)) => output,
    Ok(Err(source)) => return Err(ProcessError::Spawn { program, source }),
    Err(_) => return Err(ProcessError::Timeout { program, timeout }),
  };

  let output = ProcessOutput {
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    exit_code: output.status.code(),
  };
  event!(Level::DEBUG, %program, exit_code = ?output.exit_code, "Process finished.");
  Ok(output)
}
