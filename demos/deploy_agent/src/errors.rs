// demos/deploy_agent/src/errors.rs

use conveyor::ConveyorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Conveyor Error: {source}")]
  Conveyor {
    #[from]
    source: ConveyorError,
  },

  #[error("Report Serialization Error: {0}")]
  Report(#[from] serde_json::Error),

  #[error("I/O Error: {0}")]
  Io(#[from] std::io::Error),

  // The run finished and was reported; this only sets the exit status.
  #[error("Pipeline '{pipeline}' failed at stage '{stage}': {reason}")]
  RunFailed {
    pipeline: String,
    stage: String,
    reason: String,
  },
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
