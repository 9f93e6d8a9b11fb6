// conveyor/src/pipeline/definition.rs

//! Contains the `Pipeline<TData>` struct definition and methods for its
//! construction and structural modification.

use crate::core::context_data::ContextData;
use crate::core::stage::StageDef;
use crate::error::ConveyorError;
use crate::notify::Notifier;
use crate::remote::targets::TargetLocks;
use std::future::Future;
use std::sync::Arc;

/// An ordered list of named stages over run data `TData`, plus where the
/// single terminal notification goes.
///
/// A `Pipeline` is a definition; every call to [`Pipeline::run`] is an
/// independent run with its own id, state machine and report.
pub struct Pipeline<TData>
where
  TData: 'static + Send + Sync,
{
  pub(crate) name: String,
  pub(crate) branch: Option<String>,
  pub(crate) stages: Vec<StageDef<TData>>,
  pub(crate) notifier: Arc<dyn Notifier>,
  pub(crate) channel: String,
  /// Shared with every other pipeline that may touch the same targets.
  pub(crate) target_locks: Arc<TargetLocks>,
}

impl<TData> Pipeline<TData>
where
  TData: 'static + Send + Sync,
{
  pub fn new(name: impl Into<String>, notifier: Arc<dyn Notifier>, channel: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      branch: None,
      stages: Vec::new(),
      notifier,
      channel: channel.into(),
      target_locks: Arc::new(TargetLocks::new()),
    }
  }

  pub fn for_branch(mut self, branch: impl Into<String>) -> Self {
    self.branch = Some(branch.into());
    self
  }

  pub fn with_target_locks(mut self, locks: Arc<TargetLocks>) -> Self {
    self.target_locks = locks;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn branch(&self) -> Option<&str> {
    self.branch.as_deref()
  }

  pub fn target_locks(&self) -> &Arc<TargetLocks> {
    &self.target_locks
  }

  pub fn stage_names(&self) -> Vec<&str> {
    self.stages.iter().map(|s| s.name.as_str()).collect()
  }

  fn position(&self, stage_name: &str) -> Result<usize, ConveyorError> {
    self
      .stages
      .iter()
      .position(|s| s.name == stage_name)
      .ok_or_else(|| ConveyorError::StageNotFound {
        stage_name: stage_name.to_string(),
      })
  }

  /// Panics on a duplicate name: that is a definition bug, not a run failure.
  fn ensure_stage_not_exists(&self, stage_name: &str) {
    if self.stages.iter().any(|s| s.name == stage_name) {
      panic!("Conveyor setup error: Stage '{}' already exists in pipeline '{}'.", stage_name, self.name);
    }
  }

  /// Appends a stage.
  pub fn stage<F, E>(
    &mut self,
    name: &str,
    action: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) -> &mut Self
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<ConveyorError> + Send + 'static,
  {
    self.add_stage(StageDef::new(name, action))
  }

  /// Appends a stage that runs holding the lock of deployment target `target`.
  pub fn exclusive_stage<F, E>(
    &mut self,
    name: &str,
    target: &str,
    action: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) -> &mut Self
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<ConveyorError> + Send + 'static,
  {
    self.add_stage(StageDef::new(name, action).exclusive_on(target))
  }

  pub fn add_stage(&mut self, stage: StageDef<TData>) -> &mut Self {
    self.ensure_stage_not_exists(&stage.name);
    self.stages.push(stage);
    self
  }

  pub fn insert_stage_before(&mut self, existing: &str, stage: StageDef<TData>) -> Result<(), ConveyorError> {
    let idx = self.position(existing)?;
    self.ensure_stage_not_exists(&stage.name);
    self.stages.insert(idx, stage);
    Ok(())
  }

  pub fn insert_stage_after(&mut self, existing: &str, stage: StageDef<TData>) -> Result<(), ConveyorError> {
    let idx = self.position(existing)?;
    self.ensure_stage_not_exists(&stage.name);
    self.stages.insert(idx + 1, stage);
    Ok(())
  }

  pub fn remove_stage(&mut self, stage_name: &str) -> Result<StageDef<TData>, ConveyorError> {
    let idx = self.position(stage_name)?;
    Ok(self.stages.remove(idx))
  }
}
