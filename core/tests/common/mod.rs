// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use conveyor::remote::ProcessOutput;
use conveyor::{
  Artifact, BuildPhase, ContextData, ConveyorError, Credential, CredentialScope, CredentialSource, DeployServices,
  DeployTarget, FailureCause, Location, Notifier, ObjectStoreTarget, PackageSpec, RemoteExecutor, RunConfig,
  RunSummary, Target, TargetRegistry, Toolchain,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tempfile::TempDir;
use tracing::Level;

// --- Common Context Struct ---
#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub stages_executed: Vec<String>,
}

pub type StageResult = Result<(), ConveyorError>;

pub fn recording_stage(
  name: &'static str,
) -> impl Fn(ContextData<TestContext>) -> std::pin::Pin<Box<dyn std::future::Future<Output = StageResult> + Send>>
     + Send
     + Sync
     + 'static {
  move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().stages_executed.push(name.to_string());
      tracing::debug!(target: "test_stages", stage = name, "executed");
      Ok(())
    })
  }
}

pub fn failing_stage(
  name: &'static str,
  error: fn() -> ConveyorError,
) -> impl Fn(ContextData<TestContext>) -> std::pin::Pin<Box<dyn std::future::Future<Output = StageResult> + Send>>
     + Send
     + Sync
     + 'static {
  move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().stages_executed.push(name.to_string());
      tracing::warn!(target: "test_stages", stage = name, "failing");
      Err(error())
    })
  }
}

// --- Notifiers ---

/// Keeps every summary it is handed, with the channel it was sent to.
#[derive(Default)]
pub struct RecordingNotifier {
  pub calls: Mutex<Vec<(RunSummary, String)>>,
}

impl RecordingNotifier {
  pub fn count(&self) -> usize {
    self.calls.lock().len()
  }

  pub fn last(&self) -> Option<(RunSummary, String)> {
    self.calls.lock().last().cloned()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn notify(&self, summary: &RunSummary, channel: &str) -> Result<(), ConveyorError> {
    self.calls.lock().push((summary.clone(), channel.to_string()));
    Ok(())
  }
}

/// Counts attempts and fails every one of them.
#[derive(Default)]
pub struct FailingNotifier {
  pub attempts: AtomicUsize,
}

#[async_trait]
impl Notifier for FailingNotifier {
  async fn notify(&self, _summary: &RunSummary, channel: &str) -> Result<(), ConveyorError> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    Err(ConveyorError::Notification {
      channel: channel.to_string(),
      detail: "webhook returned 500".to_string(),
    })
  }
}

// --- Toolchain ---

/// Succeeds every phase except `fail_phase`, which exits with code 1.
#[derive(Default)]
pub struct FakeToolchain {
  pub fail_phase: Option<BuildPhase>,
  pub phases: Mutex<Vec<BuildPhase>>,
}

impl FakeToolchain {
  pub fn failing_at(phase: BuildPhase) -> Self {
    Self {
      fail_phase: Some(phase),
      phases: Mutex::new(Vec::new()),
    }
  }
}

#[async_trait]
impl Toolchain for FakeToolchain {
  async fn run_phase(&self, phase: BuildPhase, _source_dir: &Path) -> Result<ProcessOutput, ConveyorError> {
    self.phases.lock().push(phase);
    if self.fail_phase == Some(phase) {
      return Err(ConveyorError::Build {
        phase,
        exit_code: Some(1),
        detail: format!("{} phase failed", phase),
      });
    }
    Ok(ProcessOutput {
      stdout: format!("BUILD SUCCESS ({})", phase),
      stderr: String::new(),
      exit_code: Some(0),
    })
  }
}

// --- Remote executor ---

/// In-memory executor. Every call is appended to `journal` as
/// `"<kind>:<target or bucket>"`; `delay` is awaited inside each call.
#[derive(Default)]
pub struct FakeExecutor {
  pub fail_upload: Option<FailureCause>,
  pub fail_copy: Option<FailureCause>,
  pub fail_execute: Option<FailureCause>,
  pub delay: Duration,
  pub journal: Arc<Mutex<Vec<String>>>,
}

impl FakeExecutor {
  pub fn calls_of(&self, kind: &str) -> usize {
    self
      .journal
      .lock()
      .iter()
      .filter(|entry| entry.starts_with(&format!("{}:", kind)))
      .count()
  }

  async fn pause(&self) {
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
  }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
  async fn upload_to_object_store(
    &self,
    _artifact: &Artifact,
    bucket: &str,
    region: &str,
    key: &str,
    credential: Credential,
  ) -> Result<Location, ConveyorError> {
    assert!(matches!(credential, Credential::Token(_)), "upload needs a token");
    self.journal.lock().push(format!("upload:{}", bucket));
    self.pause().await;
    if let Some(cause) = self.fail_upload {
      return Err(ConveyorError::Upload {
        destination: format!("s3://{}/{}", bucket, key),
        cause,
        detail: "403 Forbidden".to_string(),
      });
    }
    Ok(Location::ObjectStore {
      bucket: bucket.to_string(),
      region: region.to_string(),
      key: key.to_string(),
    })
  }

  async fn copy_to_host(
    &self,
    _artifact: &Artifact,
    target: &Target,
    remote_path: &str,
    credential: Credential,
  ) -> Result<Location, ConveyorError> {
    assert!(matches!(credential, Credential::SshKey { .. }), "copy needs an ssh key");
    self.journal.lock().push(format!("copy:{}", target.name));
    self.pause().await;
    if let Some(cause) = self.fail_copy {
      return Err(ConveyorError::Upload {
        destination: format!("{}:{}", target.name, remote_path),
        cause,
        detail: "lost connection".to_string(),
      });
    }
    Ok(Location::RemoteHost {
      host: target.name.clone(),
      path: remote_path.to_string(),
    })
  }

  async fn execute_remote(
    &self,
    target: &Target,
    _command: &str,
    credential: Credential,
  ) -> Result<ProcessOutput, ConveyorError> {
    assert!(matches!(credential, Credential::SshKey { .. }), "execute needs an ssh key");
    self.journal.lock().push(format!("execute:{}", target.name));
    self.pause().await;
    if let Some(cause) = self.fail_execute {
      return Err(ConveyorError::RemoteExecution {
        host: target.name.clone(),
        cause,
        detail: "PLAY RECAP failed=1".to_string(),
      });
    }
    Ok(ProcessOutput {
      stdout: "PLAY RECAP ok=4 changed=1 failed=0".to_string(),
      stderr: String::new(),
      exit_code: Some(0),
    })
  }
}

// --- Credentials ---

/// Hands out a fresh token or key per acquisition and counts them.
#[derive(Default)]
pub struct StaticCredentials {
  pub acquired: AtomicUsize,
}

#[async_trait]
impl CredentialSource for StaticCredentials {
  async fn acquire(&self, scope: &CredentialScope) -> Result<Credential, ConveyorError> {
    self.acquired.fetch_add(1, Ordering::SeqCst);
    Ok(match scope {
      CredentialScope::ObjectStore { .. } => Credential::Token("test-token".to_string()),
      CredentialScope::Host { target } => Credential::SshKey {
        path: PathBuf::from(format!("/keys/{}", target)),
      },
    })
  }
}

// --- Run fixtures ---

pub const ARTIFACT_OUTPUT: &str = "target/webapp.war";

/// A source tree whose build output already exists.
pub fn workspace() -> TempDir {
  let dir = tempfile::tempdir().expect("tempdir");
  let output = dir.path().join(ARTIFACT_OUTPUT);
  std::fs::create_dir_all(output.parent().expect("parent")).expect("mkdir target");
  std::fs::write(&output, b"PK\x03\x04 fake war").expect("write artifact");
  dir
}

pub fn run_config(source_dir: &Path, target: &str) -> RunConfig {
  RunConfig {
    pipeline: "webapp".to_string(),
    branch: "main".to_string(),
    commit: None,
    source_dir: source_dir.to_path_buf(),
    package: PackageSpec {
      name: "webapp".to_string(),
      version: "1.4.0".to_string(),
      output: PathBuf::from(ARTIFACT_OUTPUT),
    },
    object_store: ObjectStoreTarget {
      bucket: "releases".to_string(),
      region: "us-east-1".to_string(),
      key_prefix: "webapp".to_string(),
    },
    deploy: DeployTarget {
      target: target.to_string(),
      remote_dir: "/opt/deploy".to_string(),
      command: "ansible-playbook -i hosts site.yml".to_string(),
    },
    channel: "#deploys".to_string(),
    command_timeout: Duration::from_secs(30),
  }
}

pub fn targets() -> Arc<TargetRegistry> {
  let mut registry = TargetRegistry::new();
  registry.insert(Target::new("web-1", "10.0.0.5").with_user("deploy"));
  registry.insert(Target::new("web-2", "10.0.0.6").with_user("deploy"));
  Arc::new(registry)
}

pub fn services(toolchain: Arc<FakeToolchain>, executor: Arc<FakeExecutor>) -> DeployServices {
  services_with_credentials(toolchain, executor, Arc::new(StaticCredentials::default()))
}

pub fn services_with_credentials(
  toolchain: Arc<FakeToolchain>,
  executor: Arc<FakeExecutor>,
  credentials: Arc<StaticCredentials>,
) -> DeployServices {
  DeployServices {
    toolchain,
    executor,
    credentials,
    targets: targets(),
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
