// conveyor/src/core/control.rs

//! Run lifecycle states, the terminal outcome of a run, and per-stage status.

use crate::error::ConveyorError;
use serde::Serialize;
use std::fmt;

/// Lifecycle of one pipeline run: `Pending → Running → {Succeeded, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
  Pending,
  Running,
  Succeeded,
  Failed,
}

impl PipelineState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, PipelineState::Succeeded | PipelineState::Failed)
  }

  /// Moves to `next`, rejecting anything outside the lifecycle graph.
  pub fn transition(&mut self, next: PipelineState) -> Result<(), ConveyorError> {
    let allowed = matches!(
      (*self, next),
      (PipelineState::Pending, PipelineState::Running)
        | (PipelineState::Running, PipelineState::Succeeded)
        | (PipelineState::Running, PipelineState::Failed)
    );
    if !allowed {
      return Err(ConveyorError::InvalidTransition {
        from: self.to_string(),
        to: next.to_string(),
      });
    }
    *self = next;
    Ok(())
  }
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineState::Pending => "pending",
      PipelineState::Running => "running",
      PipelineState::Succeeded => "succeeded",
      PipelineState::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// Terminal classification of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
  Succeeded,
  /// `stage` is the stage whose action failed; `reason` is the short failure
  /// classification from [`ConveyorError::reason`].
  Failed { stage: String, reason: String },
}

impl Outcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Outcome::Succeeded)
  }

  pub fn reason(&self) -> Option<&str> {
    match self {
      Outcome::Succeeded => None,
      Outcome::Failed { reason, .. } => Some(reason),
    }
  }

  /// The terminal lifecycle state matching this outcome.
  pub fn state(&self) -> PipelineState {
    match self {
      Outcome::Succeeded => PipelineState::Succeeded,
      Outcome::Failed { .. } => PipelineState::Failed,
    }
  }
}

/// What happened to a single stage during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
  Succeeded,
  Failed,
  /// Never started because an earlier stage failed.
  NotRun,
}
