//! Render, validate and install unit artifacts.

use super::{UnitArtifact, UnitError, UnitKind, ValidationPolicy};
use crate::env;
use crate::executor::{CommandExecutor, ExecutionCommand, ExecutionResult};
use crate::template::{Bindings, TemplateRenderer, builtin};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable that scopes the unit generator to a directory
pub const GENERATOR_UNIT_DIRS_ENV: &str = "QUADLET_UNIT_DIRS";

/// Outcome of installing a container unit
#[derive(Debug, Clone)]
pub struct ContainerUnitInstall {
    /// The installed unit
    pub artifact: UnitArtifact,
    /// Result of the generator dry-run, kept for diagnostics
    pub validation: ExecutionResult,
}

/// Builds unit artifacts through the template renderer and installs them
/// with a rename so the supervisor never observes a partial file.
///
/// File work runs on the blocking pool; the async methods never block the
/// runtime.
#[derive(Clone)]
pub struct UnitWriter {
    renderer: Arc<TemplateRenderer>,
    executor: Arc<dyn CommandExecutor>,
    unit_generator: PathBuf,
    validation: ValidationPolicy,
    timeout: Option<Duration>,
}

impl UnitWriter {
    /// Create a writer with the default generator location and strict validation
    pub fn new(renderer: TemplateRenderer, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            renderer: Arc::new(renderer),
            executor,
            unit_generator: PathBuf::from(env::defaults::UNIT_GENERATOR),
            validation: ValidationPolicy::default(),
            timeout: None,
        }
    }

    /// Set the unit generator binary
    pub fn with_unit_generator(mut self, generator: impl Into<PathBuf>) -> Self {
        self.unit_generator = generator.into();
        self
    }

    /// Set the validation policy
    pub fn with_validation(mut self, policy: ValidationPolicy) -> Self {
        self.validation = policy;
        self
    }

    /// Set the timeout applied to the generator dry-run
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Unit generator binary in use
    pub fn unit_generator(&self) -> &Path {
        &self.unit_generator
    }

    /// Render a container unit, validate it with the generator in dry-run
    /// mode and move it to `destination`.
    ///
    /// The unit is rendered into a fresh temporary directory, never into the
    /// live unit directory. Under [`ValidationPolicy::Strict`] a rejected
    /// unit is not installed.
    pub async fn install_container_unit(
        &self,
        name: &str,
        bindings: &Bindings,
        destination: &Path,
    ) -> Result<ContainerUnitInstall, UnitError> {
        let staging = tempfile::Builder::new()
            .prefix("podnet-unit-")
            .tempdir()
            .map_err(|source| UnitError::Io {
                path: std::env::temp_dir(),
                source,
            })?;

        let unit_file_name = env::container_unit_file_name(name);
        let staged_unit = staging.path().join(&unit_file_name);
        let rendered = {
            let renderer = self.renderer.clone();
            let bindings = bindings.clone();
            let staged = staged_unit.clone();
            off_runtime(&staged_unit, move || {
                Ok(renderer.render_to_file(builtin::CONTAINER_UNIT, &bindings, &staged)?)
            })
            .await?
        };

        let validation = self.dry_run(staging.path()).await?;
        if !validation.success() {
            match self.validation {
                ValidationPolicy::Strict => {
                    return Err(UnitError::Validation {
                        unit: unit_file_name,
                        result: validation,
                    });
                }
                ValidationPolicy::Permissive => {
                    warn!(
                        "Unit generator rejected {} (exit code {}), installing anyway: {}",
                        unit_file_name,
                        validation.exit_code,
                        validation.stderr.trim()
                    );
                }
            }
        }

        {
            let staged = staged_unit.clone();
            let target = destination.to_path_buf();
            let contents = rendered.clone();
            off_runtime(destination, move || {
                set_mode(&staged, UnitKind::ContainerUnit.mode())?;
                move_into_place(&staged, &target, &contents)
            })
            .await?;
        }
        info!("Installed container unit {}", destination.display());

        Ok(ContainerUnitInstall {
            artifact: UnitArtifact {
                kind: UnitKind::ContainerUnit,
                path: destination.to_path_buf(),
                rendered_content: rendered,
            },
            validation,
        })
    }

    /// Render a network unit or helper script and install it at `destination`.
    ///
    /// The content goes to a temporary file beside `destination` and is
    /// renamed over it. Scripts are installed executable.
    pub async fn install(
        &self,
        kind: UnitKind,
        bindings: &Bindings,
        destination: &Path,
    ) -> Result<UnitArtifact, UnitError> {
        let rendered = self.render(kind, bindings)?;
        self.write(kind, destination, rendered.as_bytes()).await?;
        debug!("Installed {} at {}", kind, destination.display());

        Ok(UnitArtifact {
            kind,
            path: destination.to_path_buf(),
            rendered_content: rendered,
        })
    }

    /// Install raw `contents` at `destination` through a sibling temporary
    /// file, as [`UnitWriter::install`] does for rendered text
    pub async fn write(&self, kind: UnitKind, destination: &Path, contents: &[u8]) -> Result<(), UnitError> {
        let target = destination.to_path_buf();
        let contents = contents.to_vec();
        off_runtime(destination, move || install_contents(&target, &contents, kind.mode())).await
    }

    /// Render an artifact without installing it
    pub fn render(&self, kind: UnitKind, bindings: &Bindings) -> Result<String, UnitError> {
        Ok(self.renderer.render(template_for(kind), bindings)?)
    }

    /// Remove an installed artifact.
    ///
    /// Returns `false` when there was nothing to remove.
    pub async fn remove(&self, path: &Path) -> Result<bool, UnitError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(UnitError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Whether `path` exists with exactly `contents`
    pub async fn is_current(&self, path: &Path, contents: &str) -> bool {
        matches!(tokio::fs::read_to_string(path).await, Ok(existing) if existing == contents)
    }

    async fn dry_run(&self, unit_dir: &Path) -> Result<ExecutionResult, UnitError> {
        let command = ExecutionCommand::new(self.unit_generator.display().to_string(), ["-dryrun"])
            .with_env(GENERATOR_UNIT_DIRS_ENV, unit_dir.display().to_string())
            .with_optional_timeout(self.timeout);

        debug!("Validating units in {}", unit_dir.display());
        Ok(self.executor.execute(command).await?)
    }
}

fn template_for(kind: UnitKind) -> &'static str {
    match kind {
        UnitKind::ContainerUnit => builtin::CONTAINER_UNIT,
        UnitKind::NetworkUnit => builtin::NETWORK_UNIT,
        UnitKind::AttachScript => builtin::ATTACH_SCRIPT,
        UnitKind::PeersScript => builtin::PEERS_SCRIPT,
    }
}

/// Run blocking file work on the blocking pool
async fn off_runtime<T, F>(path: &Path, work: F) -> Result<T, UnitError>
where
    F: FnOnce() -> Result<T, UnitError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| UnitError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?
}

fn set_mode(path: &Path, mode: u32) -> Result<(), UnitError> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|source| {
        UnitError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Rename `staged` over `destination`.
///
/// When the staging directory lives on another filesystem the rename fails
/// with `CrossesDevices`; the content is then staged beside the destination
/// and renamed from there.
fn move_into_place(staged: &Path, destination: &Path, contents: &str) -> Result<(), UnitError> {
    match std::fs::rename(staged, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!(
                "{} is on another filesystem, staging beside destination",
                staged.display()
            );
            install_contents(destination, contents.as_bytes(), UnitKind::ContainerUnit.mode())
        }
        Err(source) => Err(UnitError::Io {
            path: destination.to_path_buf(),
            source,
        }),
    }
}

/// Write `contents` to a hidden temporary file next to `destination`, set
/// its mode, and rename it into place.
fn install_contents(destination: &Path, contents: &[u8], mode: u32) -> Result<(), UnitError> {
    let io_error = |source: std::io::Error| UnitError::Io {
        path: destination.to_path_buf(),
        source,
    };

    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Hidden and extension-less so the unit generator ignores it
    let mut file = tempfile::Builder::new()
        .prefix(".podnet-")
        .tempfile_in(parent)
        .map_err(io_error)?;
    file.write_all(contents).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.as_file()
        .set_permissions(std::fs::Permissions::from_mode(mode))
        .map_err(io_error)?;
    file.persist(destination).map_err(|e| io_error(e.error))?;
    Ok(())
}
