// src/lib.rs

//! Conveyor: an ASYNC linear deployment pipeline executor for Rust.
//!
//! Conveyor runs a fixed chain of named stages (typically
//! compile → test → package → upload → transfer → deploy) for one trigger
//! event, with:
//!  - Strictly sequential stages that halt on the first failure.
//!  - Exactly one notification per run, whose failure never changes the outcome.
//!  - An artifact handle that records every location the build reaches.
//!  - A pluggable remote executor for object-store uploads, secure copies
//!    and remote commands.
//!  - Per-target locks so concurrent runs never interleave deployments to
//!    the same host.
//!  - A branch-keyed dispatcher that builds a fresh run per push event.

pub mod artifact;
pub mod config;
pub mod core;
pub mod deploy;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod remote;
pub mod toolchain;

// --- Re-exports for the Public API ---

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{Outcome, PipelineState, StageStatus};
pub use crate::core::stage::StageDef;

pub use crate::pipeline::definition::Pipeline;
pub use crate::pipeline::report::{NotificationStatus, RunReport, StageRecord};

pub use crate::artifact::{Artifact, ArtifactId, Location, PackageSpec};
pub use crate::config::{DeployTarget, ObjectStoreTarget, PushEvent, RunConfig};
pub use crate::deploy::{deployment_factory, deployment_pipeline, DeployRun, DeployServices};
pub use crate::notify::{LogNotifier, MessageTemplates, Notifier, RunSummary, WebhookNotifier};
pub use crate::remote::{
  Credential, CredentialScope, CredentialSource, DeployExecutor, EnvCredentials, HttpObjectStore, RemoteExecutor,
  SshTransport, Target, TargetLocks, TargetRegistry,
};
pub use crate::toolchain::{CommandToolchain, Toolchain};

pub use crate::error::{BuildPhase, ConveyorError, ConveyorResult, FailureCause};

// The dispatcher that turns push events into pipeline runs
pub use crate::registry::Dispatcher;

/*
    Core Workflow:
    1. Describe the run with a `RunConfig` (package spec, object store,
       deploy target and command, notification channel).
    2. Build `DeployServices`: a `Toolchain`, a `RemoteExecutor`, a
       `CredentialSource` and the `TargetRegistry` of known hosts.
    3. Create a `Dispatcher<DeployRun>` and register
       `deployment_factory(config, services, notifier)` for a branch.
    4. On every push, call `dispatcher.dispatch(&PushEvent::new(branch)).await`
       and inspect the returned `RunReport`.
*/
