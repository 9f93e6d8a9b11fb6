// tests/pipeline_execution_tests.rs
mod common; // Reference the common module

use common::*;
use conveyor::{
  ContextData, ConveyorError, FailureCause, NotificationStatus, Outcome, Pipeline, PipelineState, StageDef,
  StageStatus,
};
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn pipeline_with(notifier: Arc<RecordingNotifier>) -> Pipeline<TestContext> {
  Pipeline::new("webapp", notifier, "#deploys").for_branch("main")
}

#[tokio::test]
#[serial]
async fn test_pipeline_runs_stages_in_order() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let mut pipeline = pipeline_with(notifier.clone());
  pipeline
    .stage("compile", recording_stage("compile"))
    .stage("test", recording_stage("test"))
    .stage("package", recording_stage("package"));

  let ctx = ContextData::new(TestContext::default());
  let report = pipeline.run(ctx.clone()).await;

  assert!(report.is_success());
  assert_eq!(report.state, PipelineState::Succeeded);
  assert_eq!(report.pipeline, "webapp");
  assert_eq!(report.branch.as_deref(), Some("main"));
  assert_eq!(ctx.read().stages_executed, vec!["compile", "test", "package"]);
  assert_eq!(report.executed_stages(), vec!["compile", "test", "package"]);
  assert!(report.stages.iter().all(|s| s.status == StageStatus::Succeeded));
  assert_eq!(report.notification, NotificationStatus::Delivered);
}

#[tokio::test]
#[serial]
async fn test_first_failure_halts_the_run() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let mut pipeline = pipeline_with(notifier.clone());
  pipeline
    .stage("compile", recording_stage("compile"))
    .stage(
      "test",
      failing_stage("test", || ConveyorError::Build {
        phase: conveyor::BuildPhase::Test,
        exit_code: Some(1),
        detail: "3 tests failed".into(),
      }),
    )
    .stage("package", recording_stage("package"))
    .stage("deploy", recording_stage("deploy"));

  let ctx = ContextData::new(TestContext::default());
  let report = pipeline.run(ctx.clone()).await;

  assert_eq!(report.state, PipelineState::Failed);
  assert_eq!(
    report.outcome,
    Outcome::Failed {
      stage: "test".to_string(),
      reason: "test failure".to_string(),
    }
  );
  assert_eq!(ctx.read().stages_executed, vec!["compile", "test"]);

  let test_record = report.stage("test").expect("test stage record");
  assert_eq!(test_record.status, StageStatus::Failed);
  assert!(test_record.error.as_deref().unwrap_or_default().contains("3 tests failed"));
  assert_eq!(report.stage("package").map(|s| s.status), Some(StageStatus::NotRun));
  assert_eq!(report.stage("deploy").map(|s| s.status), Some(StageStatus::NotRun));
}

#[tokio::test]
#[serial]
async fn test_notifier_called_exactly_once_per_run() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let mut pipeline = pipeline_with(notifier.clone());
  pipeline.stage("only", recording_stage("only"));

  pipeline.run(ContextData::new(TestContext::default())).await;
  assert_eq!(notifier.count(), 1);

  let mut failing = pipeline_with(notifier.clone());
  failing
    .stage("first", failing_stage("first", || ConveyorError::Internal("boom".into())))
    .stage("second", recording_stage("second"));
  failing.run(ContextData::new(TestContext::default())).await;
  assert_eq!(notifier.count(), 2);

  let (summary, channel) = notifier.last().expect("a notification");
  assert_eq!(channel, "#deploys");
  assert_eq!(summary.pipeline, "webapp");
  assert!(!summary.outcome.is_success());
}

#[tokio::test]
#[serial]
async fn test_each_run_gets_its_own_id() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let mut pipeline = pipeline_with(notifier.clone());
  pipeline.stage("only", recording_stage("only"));

  let first = pipeline.run(ContextData::new(TestContext::default())).await;
  let second = pipeline.run(ContextData::new(TestContext::default())).await;

  assert_ne!(first.run_id, second.run_id);
  let ids: Vec<_> = notifier.calls.lock().iter().map(|(s, _)| s.run_id).collect();
  assert_eq!(ids, vec![first.run_id, second.run_id]);
}

#[tokio::test]
#[serial]
async fn test_empty_pipeline_fails_with_configuration_error() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let pipeline = pipeline_with(notifier.clone());

  let report = pipeline.run(ContextData::new(TestContext::default())).await;

  assert_eq!(report.state, PipelineState::Failed);
  assert!(report.stages.is_empty());
  let reason = report.outcome.reason().expect("a failure reason");
  assert!(reason.contains("no stages"), "unexpected reason: {}", reason);
  assert_eq!(notifier.count(), 1);
}

#[tokio::test]
#[serial]
async fn test_notifier_failure_does_not_change_outcome() {
  setup_tracing();
  let notifier = Arc::new(FailingNotifier::default());
  let mut pipeline: Pipeline<TestContext> = Pipeline::new("webapp", notifier.clone(), "#deploys");
  pipeline.stage("only", recording_stage("only"));

  let report = pipeline.run(ContextData::new(TestContext::default())).await;

  assert!(report.is_success());
  assert_eq!(report.state, PipelineState::Succeeded);
  assert_eq!(notifier.attempts.load(Ordering::SeqCst), 1);
  match report.notification {
    NotificationStatus::Failed { detail } => assert!(detail.contains("webhook returned 500")),
    other => panic!("Expected a failed notification, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_notification_error_from_a_stage_fails_the_run() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let mut pipeline = pipeline_with(notifier.clone());
  pipeline
    .stage(
      "announce",
      failing_stage("announce", || ConveyorError::Notification {
        channel: "#builds".into(),
        detail: "timeout".into(),
      }),
    )
    .stage("deploy", recording_stage("deploy"));

  let ctx = ContextData::new(TestContext::default());
  let report = pipeline.run(ctx.clone()).await;

  assert_eq!(report.state, PipelineState::Failed);
  assert_eq!(ctx.read().stages_executed, vec!["announce"]);
  assert_eq!(report.stage("announce").map(|s| s.status), Some(StageStatus::Failed));
  assert_eq!(report.stage("deploy").map(|s| s.status), Some(StageStatus::NotRun));
  assert_eq!(
    report.outcome,
    Outcome::Failed {
      stage: "announce".into(),
      reason: "notification failure".into()
    }
  );
  assert_eq!(notifier.count(), 1);
}

#[tokio::test]
#[serial]
async fn test_failure_at_any_position_stops_later_stages() {
  setup_tracing();
  const NAMES: [&str; 5] = ["compile", "test", "package", "upload", "deploy"];

  for failing_at in 0..NAMES.len() {
    let notifier = Arc::new(RecordingNotifier::default());
    let mut pipeline = pipeline_with(notifier.clone());
    for (i, name) in NAMES.iter().copied().enumerate() {
      if i == failing_at {
        pipeline.stage(name, failing_stage(name, || ConveyorError::Internal("boom".into())));
      } else {
        pipeline.stage(name, recording_stage(name));
      }
    }

    let ctx = ContextData::new(TestContext::default());
    let report = pipeline.run(ctx.clone()).await;

    assert_eq!(report.state, PipelineState::Failed, "failing at {}", NAMES[failing_at]);
    assert_eq!(ctx.read().stages_executed, NAMES[..=failing_at].to_vec());
    match &report.outcome {
      Outcome::Failed { stage, .. } => assert_eq!(stage, NAMES[failing_at]),
      other => panic!("expected failure at {}, got {:?}", NAMES[failing_at], other),
    }
    assert_eq!(report.stages.len(), NAMES.len());
    for record in &report.stages[..failing_at] {
      assert_eq!(record.status, StageStatus::Succeeded, "stage {}", record.name);
    }
    assert_eq!(report.stages[failing_at].status, StageStatus::Failed);
    for record in &report.stages[failing_at + 1..] {
      assert_eq!(record.status, StageStatus::NotRun, "stage {}", record.name);
    }
    assert_eq!(notifier.count(), 1);
  }
}

#[tokio::test]
#[serial]
async fn test_anyhow_errors_keep_their_classification() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let mut pipeline = pipeline_with(notifier.clone());
  pipeline.stage("deploy", |_ctx: ContextData<TestContext>| async move {
    Err::<(), anyhow::Error>(
      ConveyorError::RemoteExecution {
        host: "web-1".into(),
        cause: FailureCause::ExitCode(2),
        detail: "PLAY RECAP failed=1".into(),
      }
      .into(),
    )
  });

  let report = pipeline.run(ContextData::new(TestContext::default())).await;
  assert_eq!(report.outcome.reason(), Some("remote command failed with exit code 2"));
}

#[test]
fn test_insert_and_remove_stages() {
  let notifier = Arc::new(RecordingNotifier::default());
  let mut pipeline = pipeline_with(notifier);
  pipeline
    .stage("compile", recording_stage("compile"))
    .stage("deploy", recording_stage("deploy"));

  pipeline
    .insert_stage_after("compile", StageDef::new("test", recording_stage("test")))
    .expect("insert after");
  pipeline
    .insert_stage_before("compile", StageDef::new("checkout", recording_stage("checkout")))
    .expect("insert before");
  assert_eq!(pipeline.stage_names(), vec!["checkout", "compile", "test", "deploy"]);

  let removed = pipeline.remove_stage("checkout").expect("remove");
  assert_eq!(removed.name, "checkout");
  assert_eq!(pipeline.stage_names(), vec!["compile", "test", "deploy"]);

  let missing = pipeline.insert_stage_after("lint", StageDef::new("fmt", recording_stage("fmt")));
  assert!(matches!(missing, Err(ConveyorError::StageNotFound { stage_name }) if stage_name == "lint"));
  assert!(pipeline.remove_stage("lint").is_err());
}

#[test]
#[should_panic(expected = "already exists")]
fn test_duplicate_stage_names_panic() {
  let notifier = Arc::new(RecordingNotifier::default());
  let mut pipeline = pipeline_with(notifier);
  pipeline
    .stage("compile", recording_stage("compile"))
    .stage("compile", recording_stage("compile"));
}
