// conveyor/src/deploy.rs

//! The canonical deployment chain:
//! `compile → test → package → upload → transfer → deploy`.
//!
//! `upload`, `transfer` and `deploy` run holding the deploy target's lock, so
//! concurrent runs aimed at the same host never interleave their copies.

use crate::artifact::{self, Artifact, Location};
use crate::config::{PushEvent, RunConfig};
use crate::core::context_data::ContextData;
use crate::error::{BuildPhase, ConveyorError};
use crate::notify::Notifier;
use crate::pipeline::Pipeline;
use crate::remote::{CredentialScope, CredentialSource, RemoteExecutor, Target, TargetRegistry};
use crate::toolchain::Toolchain;
use std::sync::Arc;
use tracing::{event, Level};

pub const STAGE_COMPILE: &str = "compile";
pub const STAGE_TEST: &str = "test";
pub const STAGE_PACKAGE: &str = "package";
pub const STAGE_UPLOAD: &str = "upload";
pub const STAGE_TRANSFER: &str = "transfer";
pub const STAGE_DEPLOY: &str = "deploy";

/// Run data of one deployment run.
#[derive(Debug, Clone)]
pub struct DeployRun {
  pub config: Arc<RunConfig>,
  /// Set by the package stage; never replaced afterwards.
  pub artifact: Option<Artifact>,
}

impl DeployRun {
  pub fn new(config: Arc<RunConfig>) -> Self {
    Self { config, artifact: None }
  }
}

/// Everything the deployment stages call out to.
#[derive(Clone)]
pub struct DeployServices {
  pub toolchain: Arc<dyn Toolchain>,
  pub executor: Arc<dyn RemoteExecutor>,
  pub credentials: Arc<dyn CredentialSource>,
  pub targets: Arc<TargetRegistry>,
}

fn packaged_artifact(ctx: &ContextData<DeployRun>) -> Result<Artifact, ConveyorError> {
  ctx
    .read()
    .artifact
    .clone()
    .ok_or_else(|| ConveyorError::Internal("no artifact: the package stage has not run".to_string()))
}

fn record(ctx: &ContextData<DeployRun>, location: Location) -> Result<(), ConveyorError> {
  ctx.update(|run| match run.artifact.as_mut() {
    Some(artifact) => {
      artifact.record_location(location);
      Ok(())
    }
    None => Err(ConveyorError::Internal("no artifact to record a location on".to_string())),
  })
}

fn deploy_target(services: &DeployServices, config: &RunConfig) -> Result<Target, ConveyorError> {
  services.targets.resolve(&config.deploy.target).cloned()
}

fn build_stage(pipeline: &mut Pipeline<DeployRun>, name: &str, phase: BuildPhase, services: &DeployServices) {
  let toolchain = services.toolchain.clone();
  pipeline.stage(name, move |ctx: ContextData<DeployRun>| {
    let toolchain = toolchain.clone();
    async move {
      let config = ctx.read().config.clone();
      toolchain.run_phase(phase, &config.source_dir).await?;
      Ok::<_, ConveyorError>(())
    }
  });
}

/// Assembles the deployment pipeline for `config`.
///
/// The returned pipeline has its own target locks; the dispatcher swaps in a
/// shared set so that runs it starts serialize on common hosts.
pub fn deployment_pipeline(
  config: &RunConfig,
  services: DeployServices,
  notifier: Arc<dyn Notifier>,
) -> Pipeline<DeployRun> {
  let lock_target = config.deploy.target.clone();
  let mut pipeline = Pipeline::new(config.pipeline.clone(), notifier, config.channel.clone()).for_branch(config.branch.clone());

  build_stage(&mut pipeline, STAGE_COMPILE, BuildPhase::Compile, &services);
  build_stage(&mut pipeline, STAGE_TEST, BuildPhase::Test, &services);

  let toolchain = services.toolchain.clone();
  pipeline.stage(STAGE_PACKAGE, move |ctx: ContextData<DeployRun>| {
    let toolchain = toolchain.clone();
    async move {
      let config = ctx.read().config.clone();
      toolchain.run_phase(BuildPhase::Package, &config.source_dir).await?;
      let packaged = artifact::package(&config.source_dir, &config.package)?;
      ctx.update(|run| {
        if let Some(existing) = &run.artifact {
          return Err(ConveyorError::Internal(format!("artifact {} is already packaged", existing.id())));
        }
        run.artifact = Some(packaged);
        Ok(())
      })
    }
  });

  let svc = services.clone();
  pipeline.exclusive_stage(STAGE_UPLOAD, &lock_target, move |ctx: ContextData<DeployRun>| {
    let svc = svc.clone();
    async move {
      let config = ctx.read().config.clone();
      let artifact = packaged_artifact(&ctx)?;
      let store = &config.object_store;
      let key = config.object_key(&artifact.file_name());

      let credential = svc
        .credentials
        .acquire(&CredentialScope::ObjectStore {
          bucket: store.bucket.clone(),
        })
        .await?;
      let location = svc
        .executor
        .upload_to_object_store(&artifact, &store.bucket, &store.region, &key, credential)
        .await?;
      event!(Level::INFO, %location, "Artifact backed up to object store.");
      record(&ctx, location)
    }
  });

  let svc = services.clone();
  pipeline.exclusive_stage(STAGE_TRANSFER, &lock_target, move |ctx: ContextData<DeployRun>| {
    let svc = svc.clone();
    async move {
      let config = ctx.read().config.clone();
      let artifact = packaged_artifact(&ctx)?;
      let target = deploy_target(&svc, &config)?;
      let remote_path = config.remote_artifact_path(&artifact.file_name());

      let credential = svc
        .credentials
        .acquire(&CredentialScope::Host {
          target: target.name.clone(),
        })
        .await?;
      let location = svc
        .executor
        .copy_to_host(&artifact, &target, &remote_path, credential)
        .await?;
      event!(Level::INFO, %location, "Artifact copied to deploy target.");
      record(&ctx, location)
    }
  });

  let svc = services;
  pipeline.exclusive_stage(STAGE_DEPLOY, &lock_target, move |ctx: ContextData<DeployRun>| {
    let svc = svc.clone();
    async move {
      let config = ctx.read().config.clone();
      let target = deploy_target(&svc, &config)?;

      let credential = svc
        .credentials
        .acquire(&CredentialScope::Host {
          target: target.name.clone(),
        })
        .await?;
      let output = svc
        .executor
        .execute_remote(&target, &config.deploy.command, credential)
        .await?;
      event!(Level::INFO, target_name = %target.name, summary = %output.last_line(), "Deploy command finished.");
      Ok::<_, ConveyorError>(())
    }
  });

  pipeline
}

/// Builds a dispatcher factory that turns a push into a fresh deployment run.
pub fn deployment_factory(
  base: RunConfig,
  services: DeployServices,
  notifier: Arc<dyn Notifier>,
) -> impl Fn(&PushEvent) -> Result<(Pipeline<DeployRun>, ContextData<DeployRun>), ConveyorError> + Send + Sync + 'static {
  move |event: &PushEvent| {
    let config = base.for_push(event);
    config.validate()?;
    let pipeline = deployment_pipeline(&config, services.clone(), notifier.clone());
    let ctx = ContextData::new(DeployRun::new(Arc::new(config)));
    Ok((pipeline, ctx))
  }
}
