//! # Podnet
//!
//! Container and overlay network lifecycle orchestration. A declarative
//! per-container `config.json` (image, mounts, ports, environment and
//! network identity) is turned into unit artifacts for a systemd/Quadlet
//! host, and the supervisor is driven through the lifecycle transitions
//! that keep artifacts, services and network namespaces consistent.
//!
//! ## Architecture Overview
//!
//! - **[`executor`]**: runs external commands and captures their output
//! - **[`template`]**: renders named templates with scalar and list bindings
//! - **[`unit`]**: renders, validates and atomically installs unit artifacts
//! - **[`supervisor`]**: thin adapter over `systemctl`
//! - **[`container`]**: the lifecycle controller and overlay network aggregate
//! - **[`config`]**: orchestrator settings loaded from TOML
//!
//! ## Guarantees
//!
//! - Installed artifacts are written through a temporary file and a rename,
//!   so the supervisor never reads a half-written unit.
//! - A container unit rejected by the unit generator is not installed
//!   (unless validation is permissive).
//! - Every transition is an ordered list of idempotent steps; re-running a
//!   transition after a failure converges.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use podnet::{ContainerController, OrchestratorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OrchestratorConfig::from_toml_file("/etc/podnet/config.toml")?;
//!     let controller = ContainerController::from_config(&config);
//!
//!     controller.create_overlay_network("web1").await?;
//!     let report = controller.start("web1").await?;
//!     for step in &report.steps {
//!         println!("{}: {:?}", step.step, step.outcome);
//!     }
//!     Ok(())
//! }
//! ```

/// Command execution layer.
///
/// Describes commands as data and runs them through the [`executor::CommandExecutor`]
/// seam, on the host or composed to run inside a container.
pub mod executor;

/// Template rendering.
///
/// Named templates with `{{ key }}` placeholders; list bindings repeat
/// the line they appear on.
pub mod template;

/// Unit artifact generation.
///
/// Renders container units, network units and helper scripts, validates
/// container units with the unit generator and installs them atomically.
pub mod unit;

/// Service supervisor adapter.
pub mod supervisor;

/// Container and overlay network lifecycle.
///
/// Loads container configurations and sequences artifact generation and
/// supervisor calls for `start`, `stop` and network creation and deletion.
pub mod container;

/// Orchestrator configuration with TOML persistence.
pub mod config;

/// Environment constants and path utilities.
///
/// Centralizes the on-disk layout and unit naming used throughout
/// the crate.
pub mod env;

// CLI module for command-line interface
pub mod cli;

// Re-export main lifecycle types
pub use container::{
    ContainerController, ContainerError, ContainerSpec, ContainerState, LifecycleReport,
    LifecycleStep, StepOutcome,
};

// Re-export configuration
pub use config::OrchestratorConfig;

// Re-export execution types
pub use executor::{CommandExecutor, ExecutionCommand, ExecutionResult, HostExecutor, PrivilegeMode};

// Re-export unit types
pub use unit::{UnitArtifact, UnitKind, ValidationPolicy};
