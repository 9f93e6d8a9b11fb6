// conveyor/examples/basic_pipeline.rs

use conveyor::{ContextData, ConveyorError, LogNotifier, Outcome, Pipeline, StageStatus};
use std::sync::Arc;
use tracing::info;

// 1. Define the run data shared by the stages
#[derive(Clone, Debug, Default)]
struct BuildLog {
  lines: Vec<String>,
  artifact: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ConveyorError> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Pipeline Example ---");

  // 2. Create a pipeline that reports to the log
  let mut pipeline = Pipeline::<BuildLog>::new("example", Arc::new(LogNotifier::default()), "#builds").for_branch("main");

  // 3. Append the stages; they run in this order
  pipeline
    .stage("compile", |ctx: ContextData<BuildLog>| async move {
      ctx.update(|log| log.lines.push("compiled 42 sources".to_string()));
      Ok::<_, ConveyorError>(())
    })
    .stage("package", |ctx: ContextData<BuildLog>| async move {
      ctx.update(|log| {
        log.artifact = Some("example-0.1.0.war".to_string());
        log.lines.push("packaged example-0.1.0.war".to_string());
      });
      Ok::<_, ConveyorError>(())
    })
    // This stage needs the deploy host to itself
    .exclusive_stage("deploy", "staging", |ctx: ContextData<BuildLog>| async move {
      let artifact = ctx
        .read()
        .artifact
        .clone()
        .ok_or_else(|| anyhow::anyhow!("nothing to deploy"))?;
      tokio::time::sleep(std::time::Duration::from_millis(10)).await;
      ctx.update(|log| log.lines.push(format!("deployed {}", artifact)));
      Ok::<_, anyhow::Error>(())
    });

  // 4. Run it
  let ctx = ContextData::new(BuildLog::default());
  let report = pipeline.run(ctx.clone()).await;

  // 5. Inspect the report
  match &report.outcome {
    Outcome::Succeeded => info!(run_id = %report.run_id, "Pipeline succeeded!"),
    Outcome::Failed { stage, reason } => info!(%stage, %reason, "Pipeline failed."),
  }
  for stage in &report.stages {
    info!(stage = %stage.name, status = ?stage.status, elapsed_ms = stage.elapsed_ms, "Stage record");
  }
  for line in &ctx.read().lines {
    info!("- {}", line);
  }

  assert!(report.stages.iter().all(|s| s.status == StageStatus::Succeeded));
  assert_eq!(ctx.read().lines.len(), 3);

  Ok(())
}
