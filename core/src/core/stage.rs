// conveyor/src/core/stage.rs

//! Defines a single named stage of a pipeline and the shape of its action.

use super::ContextData;
use crate::error::ConveyorError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for a stage action.
///
/// An action receives a handle to the run's shared data and resolves to
/// `Ok(())` or the error that fails the run. Actions are never retried.
///
/// Lock guards taken on the `ContextData` must be dropped before the action
/// awaits anything (use [`ContextData::update`] for short mutations).
pub type StageAction<TData> = Arc<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<(), ConveyorError>> + Send>>
    + Send
    + Sync,
>;

/// A named stage plus the action that performs it.
#[derive(Clone)]
pub struct StageDef<TData: 'static + Send + Sync> {
  pub name: String,
  /// Name of a deployment target whose lock is held while this stage runs.
  /// Consecutive stages naming the same target share one acquisition.
  pub exclusive_target: Option<String>,
  pub action: StageAction<TData>,
}

impl<TData: 'static + Send + Sync> StageDef<TData> {
  pub fn new<F, E>(name: impl Into<String>, action: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static) -> Self
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<ConveyorError> + Send + 'static,
  {
    let action: StageAction<TData> = Arc::new(move |ctx_data| {
      let fut = action(ctx_data);
      Box::pin(async move { fut.await.map_err(Into::into) })
    });
    Self {
      name: name.into(),
      exclusive_target: None,
      action,
    }
  }

  pub fn exclusive_on(mut self, target: impl Into<String>) -> Self {
    self.exclusive_target = Some(target.into());
    self
  }
}

// The action closure has no Debug; print whether a lock scope is present instead.
impl<TData: 'static + Send + Sync> std::fmt::Debug for StageDef<TData> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StageDef")
      .field("name", &self.name)
      .field("exclusive_target", &self.exclusive_target)
      .finish()
  }
}
