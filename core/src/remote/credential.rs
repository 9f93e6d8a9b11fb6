// conveyor/src/remote/credential.rs

//! Scoped credentials. A credential is acquired right before the one remote
//! call that needs it, moved into that call, and dropped when the call returns.
//! It is deliberately not `Clone`.

use crate::error::ConveyorError;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tracing::{event, Level};

pub enum Credential {
  /// Private key file passed to ssh/scp with `-i`.
  SshKey { path: PathBuf },
  /// Bearer token for the object store.
  Token(String),
}

impl Credential {
  pub fn kind(&self) -> &'static str {
    match self {
      Credential::SshKey { .. } => "ssh-key",
      Credential::Token(_) => "token",
    }
  }
}

impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Credential::SshKey { path } => f.debug_struct("SshKey").field("path", path).finish(),
      Credential::Token(_) => f.write_str("Token([REDACTED])"),
    }
  }
}

/// What a credential is going to be used for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialScope {
  ObjectStore { bucket: String },
  Host { target: String },
}

impl fmt::Display for CredentialScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CredentialScope::ObjectStore { bucket } => write!(f, "object-store:{}", bucket),
      CredentialScope::Host { target } => write!(f, "host:{}", target),
    }
  }
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
  async fn acquire(&self, scope: &CredentialScope) -> Result<Credential, ConveyorError>;
}

/// Reads credentials from the process environment at acquisition time.
///
/// The token comes from `token_var`; the ssh key path from `ssh_key_var`,
/// optionally overridden per target by `{ssh_key_var}_{TARGET}` (upper-cased,
/// `-` replaced by `_`).
#[derive(Debug, Clone)]
pub struct EnvCredentials {
  pub token_var: String,
  pub ssh_key_var: String,
}

impl Default for EnvCredentials {
  fn default() -> Self {
    Self {
      token_var: "CONVEYOR_OBJECT_STORE_TOKEN".to_string(),
      ssh_key_var: "CONVEYOR_SSH_KEY".to_string(),
    }
  }
}

impl EnvCredentials {
  fn read(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
  }
}

#[async_trait]
impl CredentialSource for EnvCredentials {
  async fn acquire(&self, scope: &CredentialScope) -> Result<Credential, ConveyorError> {
    event!(Level::DEBUG, %scope, "Acquiring credential.");
    match scope {
      CredentialScope::ObjectStore { .. } => Self::read(&self.token_var)
        .map(Credential::Token)
        .ok_or_else(|| ConveyorError::config(format!("no object store token in ${}", self.token_var))),
      CredentialScope::Host { target } => {
        let per_target = format!("{}_{}", self.ssh_key_var, target.to_uppercase().replace('-', "_"));
        Self::read(&per_target)
          .or_else(|| Self::read(&self.ssh_key_var))
          .map(|path| Credential::SshKey { path: PathBuf::from(path) })
          .ok_or_else(|| ConveyorError::config(format!("no ssh key for target '{}' in ${}", target, self.ssh_key_var)))
      }
    }
  }
}
