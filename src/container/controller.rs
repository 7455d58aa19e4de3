//! The container lifecycle state machine.
//!
//! Each transition is an ordered sequence of idempotent steps. A failing
//! step aborts the transition and is reported as [`ContainerError::Step`];
//! re-running the whole transition converges.

use super::network::{OverlayNetwork, network_users};
use super::spec::{ContainerSnapshot, ContainerSpec};
use super::state::{
    ContainerState, LifecycleReport, LifecycleStep, Operation, StepOutcome, StepTimer,
};
use super::{ContainerError, Result};
use crate::config::OrchestratorConfig;
use crate::env;
use crate::executor::{
    CommandExecutor, ExecutionCommand, ExecutionResult, HostExecutor, PrivilegeMode, container_exec,
};
use crate::supervisor::{CommandFailed, SystemdSupervisor};
use crate::template::{Bindings, TemplateRenderer};
use crate::unit::{UnitKind, UnitWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `ip netns delete` output for a namespace that does not exist
const MISSING_NAMESPACE_MARKER: &str = "No such file or directory";

/// Where containers and units live
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    /// One subdirectory per container
    containers_dir: PathBuf,
    /// Units consumed by the supervisor
    unit_dir: PathBuf,
}

/// What a failed `start` needs to undo
#[derive(Debug, Default)]
struct StartUndo {
    created_dirs: Vec<PathBuf>,
    installed_unit: Option<PathBuf>,
    /// A unit that existed before, with its previous contents
    replaced_unit: Option<(PathBuf, Vec<u8>)>,
}

/// Sequences unit artifacts and supervisor calls for each container.
///
/// The controller holds no locks: callers serialize operations per
/// container name, and network operations per namespace.
#[derive(Clone)]
pub struct ContainerController {
    layout: Layout,
    executor: Arc<dyn CommandExecutor>,
    writer: UnitWriter,
    supervisor: SystemdSupervisor,
    privilege: PrivilegeMode,
    container_runtime: String,
    timeout: Option<Duration>,
}

impl ContainerController {
    /// Controller running commands on the host
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config, Arc::new(HostExecutor::new()))
    }

    /// Controller running commands through `executor`
    pub fn new(config: &OrchestratorConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        let timeout = config.command_timeout();
        let renderer = match &config.template_directory {
            Some(dir) => TemplateRenderer::with_template_dir(dir),
            None => TemplateRenderer::new(),
        };
        let writer = UnitWriter::new(renderer, executor.clone())
            .with_unit_generator(&config.unit_generator)
            .with_validation(config.validation)
            .with_timeout(timeout);
        let supervisor = SystemdSupervisor::new(executor.clone(), config.privilege).with_timeout(timeout);

        Self {
            layout: Layout {
                containers_dir: config.containers_directory.clone(),
                unit_dir: config.unit_directory.clone(),
            },
            executor,
            writer,
            supervisor,
            privilege: config.privilege,
            container_runtime: config.container_runtime.clone(),
            timeout,
        }
    }

    /// External tools this controller relies on that cannot be found
    pub fn missing_tools(&self) -> Vec<String> {
        let mut tools = vec![
            crate::supervisor::SYSTEMCTL.to_string(),
            self.writer.unit_generator().display().to_string(),
            self.container_runtime.clone(),
            "ip".to_string(),
        ];
        if self.privilege.is_sudo() {
            tools.push("sudo".to_string());
        }
        tools.retain(|tool| which::which(tool).is_err());
        tools
    }

    /// Load a container's spec
    pub fn load(&self, name: &str) -> Result<ContainerSpec> {
        ContainerSpec::load(name, &self.layout.containers_dir)
    }

    /// Read-only snapshot of a container's configuration
    pub fn dump(&self, name: &str) -> Result<ContainerSnapshot> {
        Ok(self.load(name)?.dump())
    }

    /// Installed container unit path
    pub fn container_unit_path(&self, name: &str) -> PathBuf {
        env::container_unit_path(&self.layout.unit_dir, name)
    }

    /// Run a command in the container's directory
    pub async fn execute(&self, spec: &ContainerSpec, command: ExecutionCommand) -> Result<ExecutionResult> {
        let command = command
            .with_working_dir(spec.directory())
            .with_optional_timeout(self.timeout);
        Ok(self.executor.execute(command).await?)
    }

    /// Run a command inside the running container
    pub async fn container_execute(
        &self,
        spec: &ContainerSpec,
        command: ExecutionCommand,
    ) -> Result<ExecutionResult> {
        let command = container_exec(&self.container_runtime, spec.name(), command);
        self.execute(spec, command).await
    }

    /// Bindings for the container unit
    pub fn container_bindings(&self, spec: &ContainerSpec) -> Bindings {
        Bindings::new()
            .scalar("name", spec.name())
            .scalar("image", &spec.config().image)
            .list("mounts", spec.mounts())
            .list("ports", spec.ports())
            .list("environment_variables", spec.environment_variables())
            .path("attach_script", &spec.attach_script())
    }

    /// Bindings for the attach script
    pub fn attach_bindings(&self, spec: &ContainerSpec) -> Bindings {
        let network = spec.network();
        Bindings::new()
            .scalar("namespace", &network.namespace)
            .scalar("name", spec.name())
            .scalar("ip_address", network.ip_address)
            .scalar("mac_address", &network.mac_address)
            .scalar("netmask", network.netmask())
    }

    /// Render the container unit without installing it
    pub fn render_container_unit(&self, name: &str) -> Result<String> {
        let spec = self.load(name)?;
        Ok(self.writer.render(UnitKind::ContainerUnit, &self.container_bindings(&spec))?)
    }

    // ---------------------------------------------------------------------
    // start
    // ---------------------------------------------------------------------

    /// Start a container.
    ///
    /// Creates missing mount sources, renders the attach script, builds and
    /// installs the container unit, reloads the supervisor and starts the
    /// service. The report carries the unit generator's dry-run result.
    ///
    /// On failure, directories and a unit file created by this call are
    /// removed again; anything that already existed is left alone.
    pub async fn start(&self, name: &str) -> Result<LifecycleReport> {
        let spec = self.load(name)?;
        let mut report = LifecycleReport::new(Operation::Start, name);
        let mut undo = StartUndo::default();

        info!("[{}] Starting container {}", report.run_id, name);
        match self.run_start(&spec, &mut report, &mut undo).await {
            Ok(()) => Ok(report),
            Err(error) => {
                self.rollback_start(&undo).await;
                Err(error)
            }
        }
    }

    async fn run_start(
        &self,
        spec: &ContainerSpec,
        report: &mut LifecycleReport,
        undo: &mut StartUndo,
    ) -> Result<()> {
        let timer = StepTimer::start(LifecycleStep::EnsureDirectories);
        let outcome = self.ensure_directories(spec, undo).await;
        report.complete(timer, outcome)?;

        let timer = StepTimer::start(LifecycleStep::EnsureAttachScript);
        let outcome = self
            .writer
            .install(UnitKind::AttachScript, &self.attach_bindings(spec), &spec.attach_script())
            .await
            .map(|artifact| {
                report.artifacts.push(artifact);
                StepOutcome::Done
            })
            .map_err(ContainerError::from);
        report.complete(timer, outcome)?;

        let timer = StepTimer::start(LifecycleStep::EnsureUnitInstalled);
        let outcome = self.ensure_unit_installed(spec, report, undo).await;
        report.complete(timer, outcome)?;

        let timer = StepTimer::start(LifecycleStep::EnsureReloaded);
        let outcome = self.reload().await;
        report.complete(timer, outcome)?;

        let timer = StepTimer::start(LifecycleStep::EnsureStarted);
        let outcome = self
            .supervisor
            .start_checked(&env::container_service_name(spec.name()))
            .await
            .map(|_| StepOutcome::Done)
            .map_err(ContainerError::from);
        report.complete(timer, outcome)?;

        Ok(())
    }

    async fn ensure_directories(&self, spec: &ContainerSpec, undo: &mut StartUndo) -> Result<StepOutcome> {
        let mut created = 0;
        for mount in &spec.config().mounts {
            let missing = missing_ancestors(&mount.source);
            if missing.is_empty() {
                continue;
            }
            tokio::fs::create_dir_all(&mount.source).await?;
            debug!("Created mount source {}", mount.source.display());
            created += missing.len();
            undo.created_dirs.extend(missing);
        }

        if created == 0 {
            Ok(StepOutcome::Skipped("all mount sources exist".into()))
        } else {
            Ok(StepOutcome::Done)
        }
    }

    async fn ensure_unit_installed(
        &self,
        spec: &ContainerSpec,
        report: &mut LifecycleReport,
        undo: &mut StartUndo,
    ) -> Result<StepOutcome> {
        let destination = self.container_unit_path(spec.name());
        let previous = match tokio::fs::read(&destination).await {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let install = self
            .writer
            .install_container_unit(spec.name(), &self.container_bindings(spec), &destination)
            .await?;

        match previous {
            None => undo.installed_unit = Some(destination),
            Some(contents) if contents != install.artifact.rendered_content.as_bytes() => {
                undo.replaced_unit = Some((destination, contents));
            }
            Some(_) => {}
        }
        report.validation = Some(install.validation);
        report.artifacts.push(install.artifact);
        Ok(StepOutcome::Done)
    }

    async fn rollback_start(&self, undo: &StartUndo) {
        if let Some(unit) = &undo.installed_unit {
            match self.writer.remove(unit).await {
                Ok(_) => info!("Rolled back {}", unit.display()),
                Err(e) => warn!("Failed to roll back {}: {}", unit.display(), e),
            }
        }

        if let Some((unit, contents)) = &undo.replaced_unit {
            match self.writer.write(UnitKind::ContainerUnit, unit, contents).await {
                Ok(()) => info!("Restored previous {}", unit.display()),
                Err(e) => warn!("Failed to restore {}: {}", unit.display(), e),
            }
        }

        // The supervisor may already have loaded the unit being undone
        if undo.installed_unit.is_some() || undo.replaced_unit.is_some() {
            match self.supervisor.reload().await {
                Ok(result) if result.success() => {}
                Ok(result) => warn!("Reload after rollback exited {}", result.exit_code),
                Err(e) => warn!("Reload after rollback failed: {}", e),
            }
        }

        // Deepest first; only empty directories are removed
        for dir in undo.created_dirs.iter().rev() {
            if let Err(e) = tokio::fs::remove_dir(dir).await {
                debug!("Leaving {} in place: {}", dir.display(), e);
            }
        }
    }

    // ---------------------------------------------------------------------
    // overlay network
    // ---------------------------------------------------------------------

    /// Create the overlay network referenced by a container.
    ///
    /// Renders the peers script and the network unit, reloads the
    /// supervisor, enables and starts the service. When the installed unit
    /// is already current and the service active, the remaining steps are
    /// skipped, so calling this once per container sharing a namespace is
    /// safe.
    pub async fn create_overlay_network(&self, name: &str) -> Result<LifecycleReport> {
        let spec = self.load(name)?;
        let network = OverlayNetwork::from_spec(&spec, &self.layout.unit_dir);
        let mut report = LifecycleReport::new(Operation::CreateOverlayNetwork, name);
        info!(
            "[{}] Creating overlay network {} for {}",
            report.run_id,
            network.namespace(),
            name
        );

        let timer = StepTimer::start(LifecycleStep::EnsurePeersScript);
        let outcome = self.ensure_peers_script(&network, &mut report).await;
        report.complete(timer, outcome)?;

        let timer = StepTimer::start(LifecycleStep::EnsureNetworkUnit);
        let outcome = self.ensure_network_unit(&network, &mut report).await;
        let already_active = matches!(outcome, Ok(StepOutcome::Skipped(_)));
        report.complete(timer, outcome)?;

        if already_active {
            let reason = format!("{} already active", network.service_name());
            report.skip(LifecycleStep::EnsureReloaded, &reason);
            report.skip(LifecycleStep::EnsureEnabled, &reason);
            report.skip(LifecycleStep::EnsureNetworkStarted, reason);
            return Ok(report);
        }

        let timer = StepTimer::start(LifecycleStep::EnsureReloaded);
        let outcome = self.reload().await;
        report.complete(timer, outcome)?;

        let timer = StepTimer::start(LifecycleStep::EnsureEnabled);
        let outcome = self
            .supervisor
            .enable_checked(network.unit_path())
            .await
            .map(|_| StepOutcome::Done)
            .map_err(ContainerError::from);
        report.complete(timer, outcome)?;

        let timer = StepTimer::start(LifecycleStep::EnsureNetworkStarted);
        let outcome = self
            .supervisor
            .start_checked(&network.service_name())
            .await
            .map(|_| StepOutcome::Done)
            .map_err(ContainerError::from);
        report.complete(timer, outcome)?;

        Ok(report)
    }

    async fn ensure_peers_script(
        &self,
        network: &OverlayNetwork,
        report: &mut LifecycleReport,
    ) -> Result<StepOutcome> {
        if let Some(dir) = network.peers_script().parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let artifact = self
            .writer
            .install(UnitKind::PeersScript, &network.peers_bindings(), network.peers_script())
            .await?;
        report.artifacts.push(artifact);
        Ok(StepOutcome::Done)
    }

    async fn ensure_network_unit(
        &self,
        network: &OverlayNetwork,
        report: &mut LifecycleReport,
    ) -> Result<StepOutcome> {
        let bindings = network.unit_bindings();
        let rendered = self.writer.render(UnitKind::NetworkUnit, &bindings)?;

        if self.writer.is_current(network.unit_path(), &rendered).await
            && self.supervisor.is_active(&network.service_name()).await?
        {
            return Ok(StepOutcome::Skipped(format!(
                "{} is current",
                network.unit_path().display()
            )));
        }

        let artifact = self
            .writer
            .install(UnitKind::NetworkUnit, &bindings, network.unit_path())
            .await?;
        report.artifacts.push(artifact);
        Ok(StepOutcome::Done)
    }

    /// Delete the network namespace referenced by a container.
    ///
    /// Only the namespace is removed; the network unit stays installed until
    /// the last container using it is stopped. An already-absent namespace
    /// is not an error.
    pub async fn delete_overlay_network(&self, name: &str) -> Result<LifecycleReport> {
        let spec = self.load(name)?;
        let namespace = spec.network().namespace.clone();
        let mut report = LifecycleReport::new(Operation::DeleteOverlayNetwork, name);
        info!("[{}] Deleting namespace {} for {}", report.run_id, namespace, name);

        let timer = StepTimer::start(LifecycleStep::DeleteNamespace);
        let command = self
            .privilege
            .apply(ExecutionCommand::new("ip", ["netns", "delete", namespace.as_str()]));
        let display = command.display();

        let outcome = match self.execute(&spec, command).await {
            Ok(result) => {
                let outcome = if result.success() {
                    Ok(StepOutcome::Done)
                } else if result.stderr.contains(MISSING_NAMESPACE_MARKER) {
                    Ok(StepOutcome::Skipped(format!("namespace {} does not exist", namespace)))
                } else {
                    Err(ContainerError::Execution(CommandFailed {
                        command: display,
                        result: result.clone(),
                    }))
                };
                report.results.push(result);
                outcome
            }
            Err(e) => Err(e),
        };
        report.complete(timer, outcome)?;

        Ok(report)
    }

    // ---------------------------------------------------------------------
    // stop
    // ---------------------------------------------------------------------

    /// Stop a container and tear down its network service.
    ///
    /// Missing artifacts are tolerated, so stopping an already stopped
    /// container succeeds. Network teardown is skipped while other installed
    /// containers still reference the same namespace.
    pub async fn stop(&self, name: &str) -> Result<LifecycleReport> {
        let spec = self.load(name)?;
        let network = OverlayNetwork::from_spec(&spec, &self.layout.unit_dir);
        let unit_path = self.container_unit_path(name);
        let mut report = LifecycleReport::new(Operation::Stop, name);
        info!("[{}] Stopping container {}", report.run_id, name);

        let timer = StepTimer::start(LifecycleStep::StopContainer);
        let outcome = self
            .stop_unit(&env::container_service_name(name), &unit_path)
            .await;
        report.complete(timer, outcome)?;

        let timer = StepTimer::start(LifecycleStep::RemoveContainerUnit);
        let outcome = self.remove_artifact(&unit_path).await;
        report.complete(timer, outcome)?;

        let users = network_users(
            &self.layout.containers_dir,
            &self.layout.unit_dir,
            network.namespace(),
            name,
        )?;

        if users.is_empty() {
            let service = network.service_name();

            let timer = StepTimer::start(LifecycleStep::StopNetwork);
            let outcome = self.stop_unit(&service, network.unit_path()).await;
            report.complete(timer, outcome)?;

            let timer = StepTimer::start(LifecycleStep::DisableNetwork);
            let outcome = self.disable_unit(&service, network.unit_path()).await;
            report.complete(timer, outcome)?;

            let timer = StepTimer::start(LifecycleStep::RemoveNetworkUnit);
            let outcome = self.remove_network_artifacts(&network).await;
            report.complete(timer, outcome)?;
        } else {
            let reason = format!("namespace {} in use by {}", network.namespace(), users.join(", "));
            report.skip(LifecycleStep::StopNetwork, &reason);
            report.skip(LifecycleStep::DisableNetwork, &reason);
            report.skip(LifecycleStep::RemoveNetworkUnit, reason);
        }

        let timer = StepTimer::start(LifecycleStep::EnsureReloaded);
        let outcome = self.reload().await;
        report.complete(timer, outcome)?;

        Ok(report)
    }

    /// Stop a service; a failure is tolerated only if its unit file is gone
    async fn stop_unit(&self, service: &str, unit_path: &Path) -> Result<StepOutcome> {
        let result = self.supervisor.stop(service).await?;
        self.tolerate_missing_unit("stop", service, unit_path, result)
    }

    /// Disable a service; a failure is tolerated only if its unit file is gone
    async fn disable_unit(&self, service: &str, unit_path: &Path) -> Result<StepOutcome> {
        let result = self.supervisor.disable(service).await?;
        self.tolerate_missing_unit("disable", service, unit_path, result)
    }

    fn tolerate_missing_unit(
        &self,
        verb: &str,
        service: &str,
        unit_path: &Path,
        result: ExecutionResult,
    ) -> Result<StepOutcome> {
        if result.success() {
            return Ok(StepOutcome::Done);
        }
        if !unit_path.exists() {
            warn!(
                "systemctl {} {} exited {} and {} is absent, treating as stopped",
                verb,
                service,
                result.exit_code,
                unit_path.display()
            );
            return Ok(StepOutcome::Skipped(format!("{} not installed", service)));
        }
        Err(ContainerError::Execution(CommandFailed {
            command: format!("systemctl {} {}", verb, service),
            result,
        }))
    }

    /// Remove the network unit, then the namespace's peers script and its
    /// directory once empty
    async fn remove_network_artifacts(&self, network: &OverlayNetwork) -> Result<StepOutcome> {
        let outcome = self.remove_artifact(network.unit_path()).await?;

        self.writer.remove(network.peers_script()).await?;
        if let Some(dir) = network.peers_script().parent()
            && let Err(e) = tokio::fs::remove_dir(dir).await
        {
            debug!("Leaving {} in place: {}", dir.display(), e);
        }

        Ok(outcome)
    }

    async fn remove_artifact(&self, path: &Path) -> Result<StepOutcome> {
        if self.writer.remove(path).await? {
            Ok(StepOutcome::Done)
        } else {
            warn!("{} was already absent", path.display());
            Ok(StepOutcome::Skipped(format!("{} absent", path.display())))
        }
    }

    async fn reload(&self) -> Result<StepOutcome> {
        self.supervisor.reload_checked().await?;
        Ok(StepOutcome::Done)
    }

    // ---------------------------------------------------------------------
    // status
    // ---------------------------------------------------------------------

    /// Observe a container's lifecycle state from disk and the supervisor
    pub async fn status(&self, name: &str) -> Result<ContainerState> {
        let spec = match self.load(name) {
            Ok(spec) => spec,
            Err(ContainerError::NotFound(_)) => return Ok(ContainerState::Absent),
            Err(e) => return Err(e),
        };

        if self.container_unit_path(name).exists() {
            let active = self
                .supervisor
                .is_active(&env::container_service_name(name))
                .await?;
            return Ok(if active {
                ContainerState::Running
            } else {
                ContainerState::Stopped
            });
        }

        let network = OverlayNetwork::from_spec(&spec, &self.layout.unit_dir);
        if network.unit_path().exists() && self.supervisor.is_active(&network.service_name()).await? {
            return Ok(ContainerState::NetworkReady);
        }

        Ok(ContainerState::Configured)
    }
}

/// `path` and its ancestors that do not exist yet, outermost first
fn missing_ancestors(path: &Path) -> Vec<PathBuf> {
    let mut missing: Vec<PathBuf> = path
        .ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();
    missing
}
