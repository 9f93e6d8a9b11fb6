// demos/deploy_agent/src/main.rs

// Runs one deployment for the push described by the environment:
// compile → test → package → upload → transfer → deploy, then notifies once.

mod config;
mod errors;

use crate::config::AgentConfig;
use crate::errors::{AgentError, Result as AgentResult};

use conveyor::{
  deployment_pipeline, ContextData, DeployExecutor, DeployRun, DeployServices, EnvCredentials, HttpObjectStore,
  LogNotifier, Notifier, Outcome, RunReport, SshTransport, WebhookNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan; // For span events in tracing

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialize tracing subscriber for logging; RUST_LOG overrides the level.
  let builder = tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE);
  if std::env::var("CONVEYOR_LOG_JSON").is_ok() {
    builder.json().init();
  } else {
    builder.init();
  }

  let config = match AgentConfig::from_env() {
    Ok(cfg) => cfg,
    Err(e) => {
      tracing::error!(error = %e, "Failed to load agent configuration.");
      return Err(e.into());
    }
  };

  let report = run_once(config).await?;
  println!("{}", serde_json::to_string_pretty(&report)?);

  match report.outcome {
    Outcome::Succeeded => Ok(()),
    Outcome::Failed { stage, reason } => Err(
      AgentError::RunFailed {
        pipeline: report.pipeline,
        stage,
        reason,
      }
      .into(),
    ),
  }
}

fn notifier_for(config: &AgentConfig) -> AgentResult<Arc<dyn Notifier>> {
  let notifier: Arc<dyn Notifier> = match &config.webhook_url {
    Some(url) => Arc::new(WebhookNotifier::new(url.clone(), WEBHOOK_TIMEOUT)?),
    None => {
      tracing::warn!("CONVEYOR_WEBHOOK_URL not set; notifications go to the log.");
      Arc::new(LogNotifier::default())
    }
  };
  Ok(notifier)
}

async fn run_once(config: AgentConfig) -> AgentResult<RunReport> {
  let run_config = config.run.for_push(&config.push);
  run_config.validate()?;

  let executor = DeployExecutor::new(
    HttpObjectStore::new(config.object_store_endpoint.clone(), run_config.command_timeout)?,
    SshTransport::default().with_command_timeout(run_config.command_timeout),
  );
  let services = DeployServices {
    toolchain: Arc::new(config.toolchain.clone()),
    executor: Arc::new(executor),
    credentials: Arc::new(EnvCredentials::default()),
    targets: Arc::new(config.targets.clone()),
  };

  let pipeline = deployment_pipeline(&run_config, services, notifier_for(&config)?);
  let ctx = ContextData::new(DeployRun::new(Arc::new(run_config)));
  let report = pipeline.run(ctx.clone()).await;

  if let Some(path) = &config.record_path {
    // Whatever was packaged is recorded, including the locations reached before a failure.
    let artifact = ctx.read().artifact.clone();
    match artifact {
      Some(artifact) => {
        tokio::fs::write(path, artifact.to_record_json()?).await?;
        tracing::info!(path = %path.display(), "Artifact record written.");
      }
      None => tracing::info!("No artifact was packaged; nothing to record."),
    }
  }

  Ok(report)
}
