// conveyor/src/notify/mod.rs

//! Terminal outcome reporting. Each run calls its notifier exactly once.
//! A failed notification is logged and reported but never changes the outcome.

pub mod template;
pub mod webhook;

pub use template::{MessageTemplates, Notification};
pub use webhook::WebhookNotifier;

use crate::core::control::Outcome;
use crate::error::ConveyorError;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{event, Level};
use uuid::Uuid;

/// What a notifier is told about a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
  pub pipeline: String,
  pub run_id: Uuid,
  pub branch: Option<String>,
  pub outcome: Outcome,
}

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, summary: &RunSummary, channel: &str) -> Result<(), ConveyorError>;
}

/// Writes the rendered message to the log instead of a chat channel.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
  pub templates: MessageTemplates,
}

#[async_trait]
impl Notifier for LogNotifier {
  async fn notify(&self, summary: &RunSummary, channel: &str) -> Result<(), ConveyorError> {
    let note = self.templates.render(summary, channel);
    if summary.outcome.is_success() {
      event!(Level::INFO, channel = %note.channel, color = note.color, "{}", note.text);
    } else {
      event!(Level::WARN, channel = %note.channel, color = note.color, "{}", note.text);
    }
    Ok(())
  }
}
