// conveyor/src/remote/object_store.rs

//! Object store upload as a single HTTP `PUT` of the artifact file.

use super::credential::Credential;
use crate::error::{ConveyorError, FailureCause};
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tracing::{event, Level};

/// Default endpoint: virtual-hosted style bucket URL.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{bucket}.s3.{region}.amazonaws.com";

#[derive(Debug, Clone)]
pub struct HttpObjectStore {
  client: reqwest::Client,
  /// Base URL with `{bucket}` and `{region}` placeholders.
  endpoint_template: String,
}

impl HttpObjectStore {
  pub fn new(endpoint_template: impl Into<String>, timeout: Duration) -> Result<Self, ConveyorError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("conveyor/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()
      .map_err(|e| ConveyorError::Internal(format!("create HTTP client: {}", e)))?;
    Ok(Self {
      client,
      endpoint_template: endpoint_template.into(),
    })
  }

  pub fn object_url(&self, bucket: &str, region: &str, key: &str) -> String {
    let base = self
      .endpoint_template
      .replace("{bucket}", bucket)
      .replace("{region}", region);
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
  }

  /// Uploads the file at `local` to `bucket/key`. Any 2xx answer is success.
  pub async fn put(
    &self,
    local: &Path,
    bucket: &str,
    region: &str,
    key: &str,
    credential: Credential,
  ) -> Result<(), ConveyorError> {
    let destination = format!("s3://{}/{}", bucket, key);
    let token = match credential {
      Credential::Token(token) => token,
      other => {
        return Err(ConveyorError::config(format!(
          "object store needs a token, got a {} credential",
          other.kind()
        )))
      }
    };

    let body = tokio::fs::read(local).await.map_err(|e| ConveyorError::Upload {
      destination: destination.clone(),
      cause: FailureCause::Io,
      detail: format!("read {}: {}", local.display(), e),
    })?;

    let url = self.object_url(bucket, region, key);
    event!(Level::INFO, %url, bytes = body.len(), "Uploading artifact to object store.");
    let response = self
      .client
      .put(&url)
      .bearer_auth(token)
      .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
      .body(body)
      .send()
      .await
      .map_err(|e| ConveyorError::Upload {
        destination: destination.clone(),
        cause: if e.is_timeout() {
          FailureCause::Timeout
        } else {
          FailureCause::Connection
        },
        detail: e.to_string(),
      })?;

    let status = response.status();
    if status.is_success() {
      event!(Level::DEBUG, %status, "Object store accepted upload.");
      return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    event!(Level::ERROR, %status, %destination, "Object store rejected upload.");
    Err(ConveyorError::Upload {
      destination,
      cause: status_cause(status),
      detail: format!("HTTP {}: {}", status, body.trim()),
    })
  }
}

fn status_cause(status: StatusCode) -> FailureCause {
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureCause::Auth,
    other => FailureCause::Rejected { status: other.as_u16() },
  }
}
