// conveyor/src/notify/template.rs

//! Outcome-specific message text and color.

use super::RunSummary;
use crate::core::control::Outcome;

pub const SUCCESS_COLOR: &str = "good";
pub const FAILURE_COLOR: &str = "danger";

/// Message templates. Placeholders: `{pipeline}`, `{run}`, `{branch}`,
/// `{stage}`, `{reason}`. Unknown placeholders are left as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplates {
  pub success: String,
  pub failure: String,
}

impl Default for MessageTemplates {
  fn default() -> Self {
    Self {
      success: "SUCCESSFUL: Pipeline '{pipeline}' [{run}] on branch {branch} deployed.".to_string(),
      failure: "FAILED: Pipeline '{pipeline}' [{run}] on branch {branch} at stage '{stage}': {reason}".to_string(),
    }
  }
}

/// A rendered message ready for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub channel: String,
  pub text: String,
  pub color: &'static str,
}

impl MessageTemplates {
  pub fn render(&self, summary: &RunSummary, channel: &str) -> Notification {
    let (template, color, stage, reason) = match &summary.outcome {
      Outcome::Succeeded => (&self.success, SUCCESS_COLOR, "", ""),
      Outcome::Failed { stage, reason } => (&self.failure, FAILURE_COLOR, stage.as_str(), reason.as_str()),
    };
    let run = summary.run_id.to_string();
    let text = template
      .replace("{pipeline}", &summary.pipeline)
      .replace("{run}", &run)
      .replace("{branch}", summary.branch.as_deref().unwrap_or("-"))
      .replace("{stage}", stage)
      .replace("{reason}", reason);
    Notification {
      channel: channel.to_string(),
      text,
      color,
    }
  }
}
