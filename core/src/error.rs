// conveyor/src/error.rs
use anyhow::Error as AnyhowError;
use std::fmt;
use thiserror::Error;

/// Build phases driven through the external build tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
  Compile,
  Test,
  Package,
}

impl BuildPhase {
  pub fn as_str(&self) -> &'static str {
    match self {
      BuildPhase::Compile => "compile",
      BuildPhase::Test => "test",
      BuildPhase::Package => "package",
    }
  }
}

impl fmt::Display for BuildPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Why a call against an external system failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
  /// Host unreachable, connection refused or reset, name resolution failure.
  Connection,
  /// Credential rejected by the remote side.
  Auth,
  /// The call did not finish within its deadline.
  Timeout,
  /// The remote side answered with a non-success HTTP status.
  Rejected { status: u16 },
  /// Local I/O failure (missing file, spawn failure).
  Io,
  /// The remote command or transfer tool exited with a non-zero code.
  ExitCode(i32),
  /// The remote command or transfer tool was killed by a signal and left no exit code.
  Signal,
}

impl fmt::Display for FailureCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailureCause::Connection => f.write_str("connection"),
      FailureCause::Auth => f.write_str("auth"),
      FailureCause::Timeout => f.write_str("timeout"),
      FailureCause::Rejected { status } => write!(f, "rejected (HTTP {})", status),
      FailureCause::Io => f.write_str("io"),
      FailureCause::ExitCode(code) => write!(f, "exit code {}", code),
      FailureCause::Signal => f.write_str("killed by signal"),
    }
  }
}

#[derive(Debug, Error)]
pub enum ConveyorError {
  #[error("{phase} failure (exit code {}): {detail}", display_exit_code(exit_code))]
  Build {
    phase: BuildPhase,
    exit_code: Option<i32>,
    detail: String,
  },

  #[error("Upload to '{destination}' failed ({cause}): {detail}")]
  Upload {
    destination: String,
    cause: FailureCause,
    detail: String,
  },

  #[error("Remote execution on '{host}' failed ({cause}): {detail}")]
  RemoteExecution {
    host: String,
    cause: FailureCause,
    detail: String,
  },

  #[error("Notification to channel '{channel}' failed: {detail}")]
  Notification { channel: String, detail: String },

  #[error("Configuration error: {message}")]
  Configuration { message: String },

  #[error("Stage not found: {stage_name}")]
  StageNotFound { stage_name: String },

  #[error("Invalid pipeline state transition from {from} to {to}")]
  InvalidTransition { from: String, to: String },

  #[error("Error in stage action or external operation. Source: {source}")]
  Handler {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal conveyor error: {0}")]
  Internal(String),
}

impl ConveyorError {
  pub fn config(message: impl Into<String>) -> Self {
    ConveyorError::Configuration {
      message: message.into(),
    }
  }

  /// Short classification recorded as the failure reason of a run.
  ///
  /// Detail (stderr, response bodies) stays in the `Display` output and the logs.
  pub fn reason(&self) -> String {
    match self {
      ConveyorError::Build { phase, .. } => format!("{} failure", phase),
      ConveyorError::Upload {
        cause: FailureCause::ExitCode(code),
        ..
      } => format!("upload failed with exit code {}", code),
      ConveyorError::Upload {
        cause: FailureCause::Signal,
        ..
      } => "upload killed by signal".to_string(),
      ConveyorError::Upload { cause, .. } => format!("upload {} failure", cause),
      ConveyorError::RemoteExecution {
        cause: FailureCause::ExitCode(code),
        ..
      } => format!("remote command failed with exit code {}", code),
      ConveyorError::RemoteExecution {
        cause: FailureCause::Signal,
        ..
      } => "remote command killed by signal".to_string(),
      ConveyorError::RemoteExecution { cause, .. } => format!("remote {} failure", cause),
      ConveyorError::Notification { .. } => "notification failure".to_string(),
      other => other.to_string(),
    }
  }
}

impl From<AnyhowError> for ConveyorError {
  fn from(err: AnyhowError) -> Self {
    // Stage code that wrapped a ConveyorError in anyhow keeps its classification.
    match err.downcast::<ConveyorError>() {
      Ok(inner) => inner,
      Err(err) => ConveyorError::Handler { source: err },
    }
  }
}

fn display_exit_code(code: &Option<i32>) -> String {
  match code {
    Some(code) => code.to_string(),
    None => "none".to_string(),
  }
}

pub type ConveyorResult<T, E = ConveyorError> = std::result::Result<T, E>;
