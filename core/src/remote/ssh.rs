// conveyor/src/remote/ssh.rs

//! Secure copy and remote command execution by driving the `scp` and `ssh`
//! binaries in batch mode.

use super::credential::Credential;
use super::process::{self, ProcessError, ProcessOutput};
use super::targets::{Target, DEFAULT_SSH_PORT};
use crate::error::{ConveyorError, FailureCause};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{event, Level};

/// stderr fragments that mean the ssh layer rejected our identity.
const AUTH_PATTERNS: &[&str] = &[
  "permission denied (publickey",
  "permission denied (password",
  "permission denied, please try again",
  "too many authentication failures",
  "authentication failed",
  "host key verification failed",
];

/// stderr fragments that mean we never reached a working session.
const CONNECTION_PATTERNS: &[&str] = &[
  "connection refused",
  "connection reset",
  "connection timed out",
  "no route to host",
  "network is unreachable",
  "temporary failure in name resolution",
  "could not resolve hostname",
  "broken pipe",
  "connection closed by remote host",
  "lost connection",
];

/// ssh exits with 255 when the failure is its own rather than the remote command's.
const SSH_TRANSPORT_EXIT: i32 = 255;

/// Maps a failed ssh/scp invocation to a failure cause.
pub fn classify_failure(output: &ProcessOutput) -> FailureCause {
  let stderr = output.stderr.to_lowercase();
  if AUTH_PATTERNS.iter().any(|p| stderr.contains(p)) {
    return FailureCause::Auth;
  }
  if output.exit_code == Some(SSH_TRANSPORT_EXIT) || CONNECTION_PATTERNS.iter().any(|p| stderr.contains(p)) {
    return FailureCause::Connection;
  }
  match output.exit_code {
    Some(code) => FailureCause::ExitCode(code),
    None => FailureCause::Signal,
  }
}

#[derive(Debug, Clone)]
pub struct SshTransport {
  pub ssh_program: PathBuf,
  pub scp_program: PathBuf,
  pub connect_timeout: Duration,
  pub command_timeout: Duration,
}

impl Default for SshTransport {
  fn default() -> Self {
    Self {
      ssh_program: PathBuf::from("ssh"),
      scp_program: PathBuf::from("scp"),
      connect_timeout: Duration::from_secs(10),
      command_timeout: Duration::from_secs(600),
    }
  }
}

impl SshTransport {
  pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
    self.command_timeout = timeout;
    self
  }

  fn common_options(&self, identity: &Path) -> Vec<String> {
    vec![
      "-i".to_string(),
      identity.display().to_string(),
      "-o".to_string(),
      "BatchMode=yes".to_string(),
      "-o".to_string(),
      format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
      "-o".to_string(),
      "ServerAliveInterval=15".to_string(),
      "-o".to_string(),
      "ServerAliveCountMax=3".to_string(),
    ]
  }

  pub(crate) fn ssh_args(&self, target: &Target, identity: &Path, command: &str) -> Vec<String> {
    let mut args = self.common_options(identity);
    if target.port != DEFAULT_SSH_PORT {
      args.push("-p".to_string());
      args.push(target.port.to_string());
    }
    args.push(target.destination());
    args.push(command.to_string());
    args
  }

  pub(crate) fn scp_args(&self, target: &Target, identity: &Path, local: &Path, remote_path: &str) -> Vec<String> {
    let mut args = self.common_options(identity);
    if target.port != DEFAULT_SSH_PORT {
      args.push("-P".to_string());
      args.push(target.port.to_string());
    }
    args.push(local.display().to_string());
    args.push(format!("{}:{}", target.copy_destination(), remote_path));
    args
  }

  fn identity(credential: &Credential, target: &Target) -> Result<PathBuf, ConveyorError> {
    match credential {
      Credential::SshKey { path } => Ok(path.clone()),
      other => Err(ConveyorError::config(format!(
        "target '{}' needs an ssh key, got a {} credential",
        target.name,
        other.kind()
      ))),
    }
  }

  /// Copies `local` to `remote_path` on `target`.
  pub async fn copy(
    &self,
    target: &Target,
    local: &Path,
    remote_path: &str,
    credential: Credential,
  ) -> Result<(), ConveyorError> {
    let identity = Self::identity(&credential, target)?;
    let destination = format!("{}:{}", target.name, remote_path);
    let mut cmd = Command::new(&self.scp_program);
    cmd.args(self.scp_args(target, &identity, local, remote_path));
    drop(credential);

    event!(Level::INFO, target_name = %target, local = %local.display(), %remote_path, "Copying artifact to host.");
    let output = process::run(cmd, self.command_timeout).await.map_err(|e| ConveyorError::Upload {
      destination: destination.clone(),
      cause: process_cause(&e),
      detail: e.to_string(),
    })?;

    if !output.success() {
      let cause = classify_failure(&output);
      event!(Level::ERROR, target_name = %target, %cause, stderr = %output.stderr.trim(), "Secure copy failed.");
      return Err(ConveyorError::Upload {
        destination,
        cause,
        detail: output.last_line(),
      });
    }
    Ok(())
  }

  /// Runs `command` on `target` and returns its output when it exits 0.
  pub async fn execute(&self, target: &Target, command: &str, credential: Credential) -> Result<ProcessOutput, ConveyorError> {
    let identity = Self::identity(&credential, target)?;
    let mut cmd = Command::new(&self.ssh_program);
    cmd.args(self.ssh_args(target, &identity, command));
    drop(credential);

    event!(Level::INFO, target_name = %target, %command, "Executing remote command.");
    let output = process::run(cmd, self.command_timeout)
      .await
      .map_err(|e| ConveyorError::RemoteExecution {
        host: target.name.clone(),
        cause: process_cause(&e),
        detail: e.to_string(),
      })?;

    if !output.success() {
      let cause = classify_failure(&output);
      event!(Level::ERROR, target_name = %target, %cause, stderr = %output.stderr.trim(), "Remote command failed.");
      return Err(ConveyorError::RemoteExecution {
        host: target.name.clone(),
        cause,
        detail: output.last_line(),
      });
    }
    Ok(output)
  }
}

fn process_cause(err: &ProcessError) -> FailureCause {
  match err {
    ProcessError::Spawn { .. } => FailureCause::Io,
    ProcessError::Timeout { .. } => FailureCause::Timeout,
  }
}
