// conveyor/src/toolchain.rs

//! The build toolchain, driven as an opaque external process per phase.
//! Exit code 0 is success; anything else fails the phase.

use crate::error::{BuildPhase, ConveyorError};
use crate::remote::process::{self, ProcessError, ProcessOutput};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{event, Level};

#[async_trait]
pub trait Toolchain: Send + Sync {
  async fn run_phase(&self, phase: BuildPhase, source_dir: &Path) -> Result<ProcessOutput, ConveyorError>;
}

/// A program plus arguments, split on whitespace. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
  pub program: String,
  pub args: Vec<String>,
}

impl BuildCommand {
  pub fn parse(line: &str) -> Result<Self, ConveyorError> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts
      .next()
      .ok_or_else(|| ConveyorError::config("build command is empty"))?;
    Ok(Self {
      program,
      args: parts.collect(),
    })
  }
}

#[derive(Debug, Clone)]
pub struct CommandToolchain {
  pub compile: BuildCommand,
  pub test: BuildCommand,
  pub package: BuildCommand,
  pub timeout: Duration,
}

impl CommandToolchain {
  /// Maven in batch mode: `mvn -B compile`, `mvn -B test`, `mvn -B -DskipTests package`.
  pub fn maven(timeout: Duration) -> Self {
    let mvn = |args: &[&str]| BuildCommand {
      program: "mvn".to_string(),
      args: args.iter().map(|a| a.to_string()).collect(),
    };
    Self {
      compile: mvn(&["-B", "compile"]),
      test: mvn(&["-B", "test"]),
      package: mvn(&["-B", "-DskipTests", "package"]),
      timeout,
    }
  }

  fn command_for(&self, phase: BuildPhase) -> &BuildCommand {
    match phase {
      BuildPhase::Compile => &self.compile,
      BuildPhase::Test => &self.test,
      BuildPhase::Package => &self.package,
    }
  }
}

#[async_trait]
impl Toolchain for CommandToolchain {
  async fn run_phase(&self, phase: BuildPhase, source_dir: &Path) -> Result<ProcessOutput, ConveyorError> {
    let spec = self.command_for(phase);
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args).current_dir(source_dir);

    event!(Level::INFO, %phase, program = %spec.program, args = ?spec.args, "Running build phase.");
    let output = process::run(cmd, self.timeout).await.map_err(|e| {
      let detail = match &e {
        ProcessError::Spawn { .. } => e.to_string(),
        ProcessError::Timeout { .. } => format!("{} (timed out)", e),
      };
      ConveyorError::Build {
        phase,
        exit_code: None,
        detail,
      }
    })?;

    if !output.success() {
      event!(Level::ERROR, %phase, exit_code = ?output.exit_code, "Build phase failed.");
      return Err(ConveyorError::Build {
        phase,
        exit_code: output.exit_code,
        detail: output.last_line(),
      });
    }
    Ok(output)
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;

  fn sh(script: &str) -> BuildCommand {
    BuildCommand {
      program: "sh".into(),
      args: vec!["-c".into(), script.into()],
    }
  }

  #[test]
  fn parses_command_lines() {
    let cmd = BuildCommand::parse("  mvn -B  -q test ").unwrap();
    assert_eq!(cmd.program, "mvn");
    assert_eq!(cmd.args, vec!["-B", "-q", "test"]);
    assert!(BuildCommand::parse("   ").is_err());
  }

  #[tokio::test]
  async fn non_zero_exit_fails_the_phase() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = CommandToolchain {
      compile: sh("true"),
      test: sh("echo '1 test failed' >&2; exit 1"),
      package: sh("mkdir -p target && echo war > target/app.war"),
      timeout: Duration::from_secs(10),
    };

    toolchain.run_phase(BuildPhase::Compile, dir.path()).await.unwrap();

    let err = toolchain.run_phase(BuildPhase::Test, dir.path()).await.unwrap_err();
    assert_eq!(err.reason(), "test failure");
    match err {
      ConveyorError::Build { exit_code, detail, .. } => {
        assert_eq!(exit_code, Some(1));
        assert_eq!(detail, "1 test failed");
      }
      other => panic!("Expected Build error, got {:?}", other),
    }

    toolchain.run_phase(BuildPhase::Package, dir.path()).await.unwrap();
    assert!(dir.path().join("target/app.war").is_file());
  }
}
