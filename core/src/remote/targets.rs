// conveyor/src/remote/targets.rs

//! Named deployment targets and the per-target locks that serialize runs
//! touching the same host.

use crate::error::ConveyorError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{event, Level};

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  pub name: String,
  pub host: String,
  pub user: Option<String>,
  pub port: u16,
}

impl Target {
  pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      host: host.into(),
      user: None,
      port: DEFAULT_SSH_PORT,
    }
  }

  pub fn with_user(mut self, user: impl Into<String>) -> Self {
    self.user = Some(user.into());
    self
  }

  pub fn with_port(mut self, port: u16) -> Self {
    self.port = port;
    self
  }

  /// `user@host`, or just `host` without a user.
  pub fn destination(&self) -> String {
    match &self.user {
      Some(user) => format!("{}@{}", user, self.host),
      None => self.host.clone(),
    }
  }

  /// Like [`destination`](Self::destination), with an IPv6 host bracketed
  /// so it survives scp's `host:path` syntax.
  pub fn copy_destination(&self) -> String {
    let host = if self.host.contains(':') {
      format!("[{}]", self.host)
    } else {
      self.host.clone()
    };
    match &self.user {
      Some(user) => format!("{}@{}", user, host),
      None => host,
    }
  }

  /// Parses `[user@]host[:port]`. IPv6 hosts must be bracketed: `[::1]:2222`.
  pub fn parse(name: &str, address: &str) -> Result<Self, ConveyorError> {
    let address = address.trim();
    let (user, rest) = match address.split_once('@') {
      Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
      Some(_) => return Err(ConveyorError::config(format!("target '{}': empty user in '{}'", name, address))),
      None => (None, address),
    };
    let (host, port) = match rest.strip_prefix('[') {
      Some(bracketed) => {
        let (host, tail) = bracketed
          .split_once(']')
          .ok_or_else(|| ConveyorError::config(format!("target '{}': unclosed '[' in '{}'", name, address)))?;
        let port = match tail {
          "" => None,
          _ => Some(tail.strip_prefix(':').ok_or_else(|| {
            ConveyorError::config(format!("target '{}': unexpected '{}' after ']'", name, tail))
          })?),
        };
        (host, port)
      }
      None => match rest.split_once(':') {
        Some((_, port)) if port.contains(':') => {
          return Err(ConveyorError::config(format!(
            "target '{}': IPv6 host '{}' must be written as [addr] or [addr]:port",
            name, rest
          )))
        }
        Some((host, port)) => (host, Some(port)),
        None => (rest, None),
      },
    };
    let port = match port {
      Some(port) => port
        .parse::<u16>()
        .map_err(|e| ConveyorError::config(format!("target '{}': invalid port '{}': {}", name, port, e)))?,
      None => DEFAULT_SSH_PORT,
    };
    if host.is_empty() {
      return Err(ConveyorError::config(format!("target '{}': empty host", name)));
    }
    Ok(Self {
      name: name.to_string(),
      host: host.to_string(),
      user,
      port,
    })
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({}:{})", self.name, self.destination(), self.port)
  }
}

/// Name → address registry injected as configuration.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
  targets: HashMap<String, Target>,
}

impl TargetRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, target: Target) -> Option<Target> {
    self.targets.insert(target.name.clone(), target)
  }

  pub fn resolve(&self, name: &str) -> Result<&Target, ConveyorError> {
    self
      .targets
      .get(name)
      .ok_or_else(|| ConveyorError::config(format!("unknown deployment target '{}'", name)))
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// Parses a comma-separated list of `name=[user@]host[:port]` entries.
  pub fn parse(spec: &str) -> Result<Self, ConveyorError> {
    let mut registry = Self::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
      let (name, address) = entry
        .split_once('=')
        .ok_or_else(|| ConveyorError::config(format!("target entry '{}' is not name=address", entry)))?;
      let name = name.trim();
      if name.is_empty() {
        return Err(ConveyorError::config(format!("target entry '{}' has no name", entry)));
      }
      if registry.insert(Target::parse(name, address)?).is_some() {
        return Err(ConveyorError::config(format!("target '{}' defined twice", name)));
      }
    }
    Ok(registry)
  }
}

/// One async mutex per target name, created on first use.
///
/// Shared (via `Arc`) by every pipeline that may run concurrently.
#[derive(Debug, Default)]
pub struct TargetLocks {
  locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TargetLocks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Waits until no other holder has `target`, then holds it until the guard drops.
  pub async fn acquire(&self, target: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut locks = self.locks.lock();
      locks.entry(target.to_string()).or_default().clone()
    };
    event!(Level::DEBUG, %target, "Waiting for target lock.");
    let guard = lock.lock_owned().await;
    event!(Level::DEBUG, %target, "Target lock acquired.");
    guard
  }

  pub fn is_held(&self, target: &str) -> bool {
    self
      .locks
      .lock()
      .get(target)
      .map_or(false, |lock| lock.try_lock().is_err())
  }
}
