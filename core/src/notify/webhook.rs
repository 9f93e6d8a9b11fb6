// conveyor/src/notify/webhook.rs

//! Chat webhook notifier: posts one colored attachment per run.

use super::template::MessageTemplates;
use super::{Notifier, RunSummary};
use crate::error::ConveyorError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{event, Level};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct WebhookPayload<'a> {
  pub channel: &'a str,
  pub username: &'a str,
  pub attachments: [Attachment<'a>; 1],
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct Attachment<'a> {
  pub color: &'a str,
  pub text: &'a str,
  pub fallback: &'a str,
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
  client: reqwest::Client,
  url: String,
  pub username: String,
  pub templates: MessageTemplates,
}

impl WebhookNotifier {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ConveyorError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("conveyor/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()
      .map_err(|e| ConveyorError::Internal(format!("create HTTP client: {}", e)))?;
    Ok(Self {
      client,
      url: url.into(),
      username: "conveyor".to_string(),
      templates: MessageTemplates::default(),
    })
  }

  pub fn with_templates(mut self, templates: MessageTemplates) -> Self {
    self.templates = templates;
    self
  }
}

#[async_trait]
impl Notifier for WebhookNotifier {
  async fn notify(&self, summary: &RunSummary, channel: &str) -> Result<(), ConveyorError> {
    let note = self.templates.render(summary, channel);
    let payload = WebhookPayload {
      channel: &note.channel,
      username: &self.username,
      attachments: [Attachment {
        color: note.color,
        text: &note.text,
        fallback: &note.text,
      }],
    };

    let failure = |detail: String| ConveyorError::Notification {
      channel: channel.to_string(),
      detail,
    };

    event!(Level::DEBUG, %channel, color = note.color, "Posting run notification.");
    let response = self
      .client
      .post(&self.url)
      .json(&payload)
      .send()
      .await
      .map_err(|e| failure(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(failure(format!("HTTP {}: {}", status, body.trim())));
    }
    Ok(())
  }
}
