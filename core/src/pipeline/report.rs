// conveyor/src/pipeline/report.rs

//! The record a finished run leaves behind.

use crate::core::control::{Outcome, PipelineState, StageStatus};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
  pub name: String,
  pub status: StageStatus,
  pub elapsed_ms: u64,
  /// Full error text when the stage failed.
  pub error: Option<String>,
}

impl StageRecord {
  pub(crate) fn not_run(name: &str) -> Self {
    Self {
      name: name.to_string(),
      status: StageStatus::NotRun,
      elapsed_ms: 0,
      error: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
  Delivered,
  Failed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
  pub run_id: Uuid,
  pub pipeline: String,
  pub branch: Option<String>,
  pub state: PipelineState,
  pub outcome: Outcome,
  pub stages: Vec<StageRecord>,
  pub notification: NotificationStatus,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.outcome.is_success()
  }

  pub fn stage(&self, name: &str) -> Option<&StageRecord> {
    self.stages.iter().find(|s| s.name == name)
  }

  /// Names of stages whose action was invoked, in order.
  pub fn executed_stages(&self) -> Vec<&str> {
    self
      .stages
      .iter()
      .filter(|s| s.status != StageStatus::NotRun)
      .map(|s| s.name.as_str())
      .collect()
  }
}
