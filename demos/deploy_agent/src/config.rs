// demos/deploy_agent/src/config.rs

use crate::errors::{AgentError, Result};
use conveyor::config::DEFAULT_COMMAND_TIMEOUT;
use conveyor::remote::object_store::DEFAULT_ENDPOINT_TEMPLATE;
use conveyor::toolchain::BuildCommand;
use conveyor::{CommandToolchain, DeployTarget, ObjectStoreTarget, PackageSpec, PushEvent, RunConfig, TargetRegistry};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentConfig {
  pub run: RunConfig,
  pub push: PushEvent,
  pub targets: TargetRegistry,

  pub object_store_endpoint: String,
  /// Chat webhook; without one, notifications go to the log.
  pub webhook_url: Option<String>,
  pub toolchain: CommandToolchain,

  /// Where the artifact record JSON is written after the run, if anywhere.
  pub record_path: Option<PathBuf>,
}

impl AgentConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AgentError::Config(format!("Missing environment variable '{}'", var_name)))
    };
    let or_default = |var_name: &str, default: &str| get_env(var_name).unwrap_or_else(|_| default.to_string());

    let command_timeout = match get_env("CONVEYOR_COMMAND_TIMEOUT_SECS") {
      Ok(raw) => Duration::from_secs(
        raw
          .parse::<u64>()
          .map_err(|e| AgentError::Config(format!("Invalid CONVEYOR_COMMAND_TIMEOUT_SECS: {}", e)))?,
      ),
      Err(_) => DEFAULT_COMMAND_TIMEOUT,
    };

    let targets = TargetRegistry::parse(&get_env("CONVEYOR_TARGETS")?)
      .map_err(|e| AgentError::Config(format!("Invalid CONVEYOR_TARGETS: {}", e)))?;

    let mut toolchain = CommandToolchain::maven(command_timeout);
    for (var_name, slot) in [
      ("CONVEYOR_COMPILE_CMD", &mut toolchain.compile),
      ("CONVEYOR_TEST_CMD", &mut toolchain.test),
      ("CONVEYOR_PACKAGE_CMD", &mut toolchain.package),
    ] {
      if let Ok(line) = get_env(var_name) {
        *slot = BuildCommand::parse(&line).map_err(|e| AgentError::Config(format!("Invalid {}: {}", var_name, e)))?;
      }
    }

    let run = RunConfig {
      pipeline: or_default("CONVEYOR_PIPELINE", "webapp"),
      branch: or_default("CONVEYOR_BRANCH", "main"),
      commit: None,
      source_dir: PathBuf::from(or_default("CONVEYOR_SOURCE_DIR", ".")),
      package: PackageSpec {
        name: get_env("CONVEYOR_ARTIFACT_NAME")?,
        version: get_env("CONVEYOR_ARTIFACT_VERSION")?,
        output: PathBuf::from(get_env("CONVEYOR_ARTIFACT_OUTPUT")?),
      },
      object_store: ObjectStoreTarget {
        bucket: get_env("CONVEYOR_BUCKET")?,
        region: or_default("CONVEYOR_REGION", "us-east-1"),
        key_prefix: or_default("CONVEYOR_KEY_PREFIX", ""),
      },
      deploy: DeployTarget {
        target: get_env("CONVEYOR_DEPLOY_TARGET")?,
        remote_dir: or_default("CONVEYOR_REMOTE_DIR", "/opt/deploy"),
        command: get_env("CONVEYOR_DEPLOY_COMMAND")?,
      },
      channel: or_default("CONVEYOR_CHANNEL", "#deployments"),
      command_timeout,
    };

    let mut push = PushEvent::new(run.branch.clone());
    if let Ok(commit) = get_env("CONVEYOR_COMMIT") {
      push = push.with_commit(commit);
    }

    let config = Self {
      run,
      push,
      targets,
      object_store_endpoint: or_default("CONVEYOR_OBJECT_STORE_ENDPOINT", DEFAULT_ENDPOINT_TEMPLATE),
      webhook_url: get_env("CONVEYOR_WEBHOOK_URL").ok(),
      toolchain,
      record_path: get_env("CONVEYOR_RECORD_PATH").ok().map(PathBuf::from),
    };

    tracing::info!(
      pipeline = %config.run.pipeline,
      branch = %config.push.branch,
      targets = config.targets.len(),
      webhook = config.webhook_url.is_some(),
      "Agent configuration loaded."
    );
    Ok(config)
  }
}
