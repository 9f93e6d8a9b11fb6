// conveyor/src/pipeline/execution.rs

//! Contains `Pipeline::run()`: the stage sequencer. Stages run strictly in
//! declaration order, the first failure ends the run, and the notifier is
//! called exactly once with the terminal outcome.

use crate::core::context_data::ContextData;
use crate::core::control::{Outcome, PipelineState, StageStatus};
use crate::error::ConveyorError;
use crate::notify::RunSummary;
use crate::pipeline::definition::Pipeline;
use crate::pipeline::report::{NotificationStatus, RunReport, StageRecord};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::{event, instrument, span, Instrument, Level};
use uuid::Uuid;

/// Stage name recorded when a run fails before any stage could start.
const NO_STAGE: &str = "-";

/// The target lock currently held by a run, and for which target.
type HeldLock = Option<(String, OwnedMutexGuard<()>)>;

impl<TData> Pipeline<TData>
where
  TData: 'static + Send + Sync,
{
  /// Executes one run of this pipeline against `ctx_data`.
  ///
  /// Never returns an error: a failing stage is recorded in the returned
  /// report's outcome, and a failing notifier in its notification status.
  #[instrument(
        name = "Pipeline::run",
        skip_all,
        fields(
            pipeline = %self.name,
            branch = self.branch.as_deref().unwrap_or("-"),
            num_stages = self.stages.len(),
            run_id = tracing::field::Empty,
        )
    )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> RunReport {
    let run_id = Uuid::new_v4();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));

    let mut state = PipelineState::Pending;
    let mut records: Vec<StageRecord> = self.stages.iter().map(|s| StageRecord::not_run(&s.name)).collect();

    advance(&mut state, PipelineState::Running);
    event!(Level::INFO, "Pipeline run started.");

    let outcome = self.execute_stages(ctx_data, &mut records).await;
    advance(&mut state, outcome.state());
    match &outcome {
      Outcome::Succeeded => event!(Level::INFO, "Pipeline run succeeded."),
      Outcome::Failed { stage, reason } => event!(Level::ERROR, %stage, %reason, "Pipeline run failed."),
    }

    let summary = RunSummary {
      pipeline: self.name.clone(),
      run_id,
      branch: self.branch.clone(),
      outcome: outcome.clone(),
    };
    let notification = match self.notifier.notify(&summary, &self.channel).await {
      Ok(()) => NotificationStatus::Delivered,
      Err(e) => {
        // The outcome is already final; a lost message only gets reported.
        event!(Level::WARN, error = %e, channel = %self.channel, "Notification failed.");
        NotificationStatus::Failed { detail: e.to_string() }
      }
    };

    RunReport {
      run_id,
      pipeline: self.name.clone(),
      branch: self.branch.clone(),
      state,
      outcome,
      stages: records,
      notification,
    }
  }

  async fn execute_stages(&self, ctx_data: ContextData<TData>, records: &mut [StageRecord]) -> Outcome {
    if self.stages.is_empty() {
      let err = ConveyorError::config(format!("pipeline '{}' has no stages", self.name));
      event!(Level::ERROR, error = %err, "Nothing to run.");
      return Outcome::Failed {
        stage: NO_STAGE.to_string(),
        reason: err.reason(),
      };
    }

    let mut held: HeldLock = None;

    for (stage_idx, stage_def) in self.stages.iter().enumerate() {
      let stage_span = span!(
        Level::INFO,
        "pipeline_stage",
        stage_name = stage_def.name.as_str(),
        stage_index = stage_idx,
        exclusive_target = stage_def.exclusive_target.as_deref().unwrap_or("-")
      );

      self
        .hold_lock_for(stage_def.exclusive_target.as_deref(), &mut held)
        .instrument(stage_span.clone())
        .await;

      let started = Instant::now();
      let result = (stage_def.action)(ctx_data.clone()).instrument(stage_span.clone()).await;
      let record = &mut records[stage_idx];
      record.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

      match result {
        Ok(()) => {
          record.status = StageStatus::Succeeded;
          event!(parent: &stage_span, Level::DEBUG, elapsed_ms = record.elapsed_ms, "Stage finished.");
        }
        Err(e) => {
          record.status = StageStatus::Failed;
          record.error = Some(e.to_string());
          event!(parent: &stage_span, Level::ERROR, error = %e, "Stage failed; halting pipeline.");
          return Outcome::Failed {
            stage: stage_def.name.clone(),
            reason: e.reason(),
          };
        }
      }
    }

    Outcome::Succeeded
  }

  /// Makes `held` match what the next stage needs.
  ///
  /// Consecutive stages naming the same target keep one acquisition; moving to
  /// another target (or to none) releases the current lock first, so a run
  /// never holds two target locks at once.
  async fn hold_lock_for(&self, wanted: Option<&str>, held: &mut HeldLock) {
    let keep = matches!((wanted, held.as_ref()), (Some(w), Some((h, _))) if w == h.as_str());
    if keep {
      return;
    }
    if let Some((previous, _guard)) = held.take() {
      event!(Level::DEBUG, target_name = %previous, "Releasing target lock.");
    }
    if let Some(target) = wanted {
      let guard = self.target_locks.acquire(target).await;
      *held = Some((target.to_string(), guard));
    }
  }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
  if let Err(e) = state.transition(next) {
    event!(Level::ERROR, error = %e, "Unexpected pipeline state transition.");
  }
}
