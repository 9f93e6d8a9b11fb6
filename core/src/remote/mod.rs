// conveyor/src/remote/mod.rs

//! The remote executor: every action a run takes against an external system.
//!
//! Calls block the calling stage until they finish or time out. Nothing is
//! retried and no state survives between calls; each call consumes the
//! credential it was given.

pub mod credential;
pub mod object_store;
pub mod process;
pub mod ssh;
pub mod targets;

pub use credential::{Credential, CredentialScope, CredentialSource, EnvCredentials};
pub use object_store::HttpObjectStore;
pub use process::ProcessOutput;
pub use ssh::SshTransport;
pub use targets::{Target, TargetLocks, TargetRegistry};

use crate::artifact::{Artifact, Location};
use crate::error::{ConveyorError, FailureCause};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
  /// `PUT`s the artifact's local file to `bucket/key` and returns the new location.
  async fn upload_to_object_store(
    &self,
    artifact: &Artifact,
    bucket: &str,
    region: &str,
    key: &str,
    credential: Credential,
  ) -> Result<Location, ConveyorError>;

  /// Secure-copies the artifact's local file to `remote_path` on `target`.
  async fn copy_to_host(
    &self,
    artifact: &Artifact,
    target: &Target,
    remote_path: &str,
    credential: Credential,
  ) -> Result<Location, ConveyorError>;

  /// Runs one command on `target`; a non-zero exit is an error.
  async fn execute_remote(
    &self,
    target: &Target,
    command: &str,
    credential: Credential,
  ) -> Result<ProcessOutput, ConveyorError>;
}

fn local_file<'a>(artifact: &'a Artifact, destination: &str) -> Result<&'a Path, ConveyorError> {
  artifact.local_path().ok_or_else(|| ConveyorError::Upload {
    destination: destination.to_string(),
    cause: FailureCause::Io,
    detail: format!("artifact {} has no local file", artifact.id()),
  })
}

/// The production executor: HTTP object store plus ssh/scp.
#[derive(Debug, Clone)]
pub struct DeployExecutor {
  pub object_store: HttpObjectStore,
  pub ssh: SshTransport,
}

impl DeployExecutor {
  pub fn new(object_store: HttpObjectStore, ssh: SshTransport) -> Self {
    Self { object_store, ssh }
  }
}

#[async_trait]
impl RemoteExecutor for DeployExecutor {
  async fn upload_to_object_store(
    &self,
    artifact: &Artifact,
    bucket: &str,
    region: &str,
    key: &str,
    credential: Credential,
  ) -> Result<Location, ConveyorError> {
    let local = local_file(artifact, &format!("s3://{}/{}", bucket, key))?;
    self.object_store.put(local, bucket, region, key, credential).await?;
    Ok(Location::ObjectStore {
      bucket: bucket.to_string(),
      region: region.to_string(),
      key: key.to_string(),
    })
  }

  async fn copy_to_host(
    &self,
    artifact: &Artifact,
    target: &Target,
    remote_path: &str,
    credential: Credential,
  ) -> Result<Location, ConveyorError> {
    let local = local_file(artifact, &format!("{}:{}", target.name, remote_path))?;
    self.ssh.copy(target, local, remote_path, credential).await?;
    Ok(Location::RemoteHost {
      host: target.name.clone(),
      path: remote_path.to_string(),
    })
  }

  async fn execute_remote(
    &self,
    target: &Target,
    command: &str,
    credential: Credential,
  ) -> Result<ProcessOutput, ConveyorError> {
    self.ssh.execute(target, command, credential).await
  }
}
