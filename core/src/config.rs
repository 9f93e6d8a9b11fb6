// conveyor/src/config.rs

//! Per-run configuration. Every value a stage needs is carried here and handed
//! to the run at construction; nothing is read from ambient global state.

use crate::artifact::PackageSpec;
use crate::error::ConveyorError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// A version-control push that triggers a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
  pub branch: String,
  #[serde(default)]
  pub commit: Option<String>,
}

impl PushEvent {
  pub fn new(branch: impl Into<String>) -> Self {
    Self {
      branch: branch.into(),
      commit: None,
    }
  }

  pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
    self.commit = Some(commit.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreTarget {
  pub bucket: String,
  pub region: String,
  /// Prefix of object keys; the artifact lands at `{prefix}/{version}/{file}`.
  pub key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
  /// Name resolved through the target registry.
  pub target: String,
  /// Directory on the host that receives the artifact file.
  pub remote_dir: String,
  /// Single command run on the host after the copy, e.g. an ansible-playbook call.
  pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
  pub pipeline: String,
  pub branch: String,
  pub commit: Option<String>,
  pub source_dir: PathBuf,
  pub package: PackageSpec,
  pub object_store: ObjectStoreTarget,
  pub deploy: DeployTarget,
  /// Chat channel receiving the terminal notification.
  pub channel: String,
  pub command_timeout: Duration,
}

impl RunConfig {
  /// Stamps the trigger's branch and commit onto a copy of this configuration.
  pub fn for_push(&self, event: &PushEvent) -> Self {
    let mut cfg = self.clone();
    cfg.branch = event.branch.clone();
    cfg.commit = event.commit.clone();
    cfg
  }

  pub fn object_key(&self, file_name: &str) -> String {
    let prefix = self.object_store.key_prefix.trim_end_matches('/');
    if prefix.is_empty() {
      format!("{}/{}", self.package.version, file_name)
    } else {
      format!("{}/{}/{}", prefix, self.package.version, file_name)
    }
  }

  pub fn remote_artifact_path(&self, file_name: &str) -> String {
    format!("{}/{}", self.deploy.remote_dir.trim_end_matches('/'), file_name)
  }

  pub fn validate(&self) -> Result<(), ConveyorError> {
    let required = [
      ("pipeline", self.pipeline.as_str()),
      ("branch", self.branch.as_str()),
      ("package.name", self.package.name.as_str()),
      ("package.version", self.package.version.as_str()),
      ("object_store.bucket", self.object_store.bucket.as_str()),
      ("object_store.region", self.object_store.region.as_str()),
      ("deploy.target", self.deploy.target.as_str()),
      ("deploy.remote_dir", self.deploy.remote_dir.as_str()),
      ("deploy.command", self.deploy.command.as_str()),
      ("channel", self.channel.as_str()),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
      return Err(ConveyorError::config(format!("run configuration field '{}' is empty", field)));
    }
    if self.package.output.as_os_str().is_empty() {
      return Err(ConveyorError::config("run configuration field 'package.output' is empty"));
    }
    if self.command_timeout.is_zero() {
      return Err(ConveyorError::config("command timeout must be greater than zero"));
    }
    Ok(())
  }
}
