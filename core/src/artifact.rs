// conveyor/src/artifact.rs

//! The artifact handle: a build output's fixed identity plus every place a copy
//! of it has been put during a run.

use crate::error::{BuildPhase, ConveyorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{event, Level};

/// Name and version of a packaged build. Immutable once packaged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId {
  pub name: String,
  pub version: String,
}

impl fmt::Display for ArtifactId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.name, self.version)
  }
}

/// One place a copy of the artifact lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
  Local { path: PathBuf },
  ObjectStore { bucket: String, region: String, key: String },
  RemoteHost { host: String, path: String },
}

impl Location {
  pub fn is_remote(&self) -> bool {
    !matches!(self, Location::Local { .. })
  }
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Location::Local { path } => write!(f, "file://{}", path.display()),
      Location::ObjectStore { bucket, region, key } => write!(f, "s3://{}/{} ({})", bucket, key, region),
      Location::RemoteHost { host, path } => write!(f, "{}:{}", host, path),
    }
  }
}

/// Where the build tool leaves its single output file, and what to call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
  pub name: String,
  pub version: String,
  /// Output path relative to the source directory, e.g. `target/webapp.war`.
  pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  id: ArtifactId,
  locations: Vec<Location>,
}

impl Artifact {
  pub fn new(id: ArtifactId, local_path: PathBuf) -> Self {
    Self {
      id,
      locations: vec![Location::Local { path: local_path }],
    }
  }

  pub fn id(&self) -> &ArtifactId {
    &self.id
  }

  pub fn locations(&self) -> &[Location] {
    &self.locations
  }

  /// Path of the packaged file on the build machine.
  pub fn local_path(&self) -> Option<&Path> {
    self.locations.iter().find_map(|loc| match loc {
      Location::Local { path } => Some(path.as_path()),
      _ => None,
    })
  }

  /// File name used for remote copies: the packaged file's own name.
  pub fn file_name(&self) -> String {
    self
      .local_path()
      .and_then(|p| p.file_name())
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.id.to_string())
  }

  pub fn remote_locations(&self) -> impl Iterator<Item = &Location> {
    self.locations.iter().filter(|loc| loc.is_remote())
  }

  /// Appends `location` unless it is already recorded. Returns whether it was new.
  pub fn record_location(&mut self, location: Location) -> bool {
    if self.locations.contains(&location) {
      event!(Level::TRACE, artifact = %self.id, %location, "Location already recorded.");
      return false;
    }
    event!(Level::DEBUG, artifact = %self.id, %location, "Recording artifact location.");
    self.locations.push(location);
    true
  }

  /// JSON record of the artifact, kept after the run finishes.
  pub fn to_record_json(&self) -> Result<String, ConveyorError> {
    serde_json::to_string_pretty(self).map_err(|e| ConveyorError::Internal(format!("artifact record: {}", e)))
  }
}

/// Captures the build's output file as an artifact with a fixed identity.
///
/// The build must have produced exactly the file named by `spec.output`;
/// a missing file or a directory in its place is a package failure.
pub fn package(source_dir: &Path, spec: &PackageSpec) -> Result<Artifact, ConveyorError> {
  let output = source_dir.join(&spec.output);
  let metadata = std::fs::metadata(&output).map_err(|e| ConveyorError::Build {
    phase: BuildPhase::Package,
    exit_code: None,
    detail: format!("expected artifact at {}: {}", output.display(), e),
  })?;
  if !metadata.is_file() {
    return Err(ConveyorError::Build {
      phase: BuildPhase::Package,
      exit_code: None,
      detail: format!("{} is not a regular file", output.display()),
    });
  }

  let id = ArtifactId {
    name: spec.name.clone(),
    version: spec.version.clone(),
  };
  event!(Level::INFO, artifact = %id, path = %output.display(), bytes = metadata.len(), "Artifact packaged.");
  Ok(Artifact::new(id, output))
}
