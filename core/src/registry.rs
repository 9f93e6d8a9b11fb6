// conveyor/src/registry.rs

//! Defines the `Dispatcher<TData>`: a branch-keyed registry that turns each
//! push event into a fresh pipeline run.
//!
//! Every pipeline it starts shares the dispatcher's `TargetLocks`, so runs for
//! different pushes may proceed in parallel while still serializing on any
//! deployment target they have in common.

use crate::config::PushEvent;
use crate::core::context_data::ContextData;
use crate::error::ConveyorError;
use crate::pipeline::{Pipeline, RunReport};
use crate::remote::targets::TargetLocks;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Route used when no branch-specific pipeline is registered.
pub const ANY_BRANCH: &str = "*";

/// Builds the pipeline and initial run data for one push.
pub type PipelineFactory<TData> =
  Arc<dyn Fn(&PushEvent) -> Result<(Pipeline<TData>, ContextData<TData>), ConveyorError> + Send + Sync>;

pub struct Dispatcher<TData>
where
  TData: 'static + Send + Sync,
{
  routes: Mutex<HashMap<String, PipelineFactory<TData>>>,
  locks: Arc<TargetLocks>,
}

impl<TData> Default for Dispatcher<TData>
where
  TData: 'static + Send + Sync,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<TData> Dispatcher<TData>
where
  TData: 'static + Send + Sync,
{
  pub fn new() -> Self {
    Self::with_locks(Arc::new(TargetLocks::new()))
  }

  pub fn with_locks(locks: Arc<TargetLocks>) -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      locks,
    }
  }

  pub fn target_locks(&self) -> &Arc<TargetLocks> {
    &self.locks
  }

  /// Registers the factory for pushes to `branch` (or [`ANY_BRANCH`]).
  /// A later registration for the same branch replaces the earlier one.
  pub fn register<F>(&self, branch: &str, factory: F)
  where
    F: Fn(&PushEvent) -> Result<(Pipeline<TData>, ContextData<TData>), ConveyorError> + Send + Sync + 'static,
  {
    event!(Level::DEBUG, %branch, "Registering pipeline factory.");
    self.routes.lock().insert(branch.to_string(), Arc::new(factory));
  }

  pub fn has_route(&self, branch: &str) -> bool {
    let routes = self.routes.lock();
    routes.contains_key(branch) || routes.contains_key(ANY_BRANCH)
  }

  /// Starts a run for `event` and waits for it to finish.
  ///
  /// Errors only when no run could be created (unknown branch, factory
  /// failure). A run that starts always yields a report, failed or not.
  #[instrument(name = "Dispatcher::dispatch", skip_all, fields(branch = %event.branch), err(Display))]
  pub async fn dispatch(&self, event: &PushEvent) -> Result<RunReport, ConveyorError> {
    let factory = {
      let routes = self.routes.lock();
      routes
        .get(&event.branch)
        .or_else(|| routes.get(ANY_BRANCH))
        .cloned()
        .ok_or_else(|| {
          event!(Level::WARN, "No pipeline registered for branch.");
          ConveyorError::config(format!("no pipeline registered for branch '{}'", event.branch))
        })?
    };

    let (pipeline, ctx_data) = factory(event)?;
    let pipeline = pipeline.with_target_locks(self.locks.clone());
    Ok(pipeline.run(ctx_data).await)
  }
}
