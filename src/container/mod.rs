//! Container and overlay network lifecycle.
//!
//! This module turns a container's declarative `config.json` into installed
//! unit artifacts and drives the supervisor through the lifecycle
//! transitions: `start`, `stop`, `create_overlay_network` and
//! `delete_overlay_network`.
//!
//! ## Architecture
//!
//! - [`spec`]: [`ContainerSpec`] and its configuration schema
//! - [`network`]: the [`OverlayNetwork`] aggregate, keyed by namespace
//! - [`state`]: lifecycle states, tagged steps and per-operation reports
//! - [`controller`]: [`ContainerController`], the lifecycle state machine
//!
//! ## Usage
//!
//! ```rust,no_run
//! use podnet::config::OrchestratorConfig;
//! use podnet::container::ContainerController;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OrchestratorConfig::default();
//!     let controller = ContainerController::from_config(&config);
//!
//!     controller.create_overlay_network("web1").await?;
//!     let report = controller.start("web1").await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!
//!     controller.stop("web1").await?;
//!     Ok(())
//! }
//! ```

mod controller;
mod network;
mod spec;
mod state;

pub use controller::ContainerController;
pub use network::{OverlayNetwork, network_users};
pub use spec::{
    ContainerConfig, ContainerSnapshot, ContainerSpec, Mount, NetworkIdentity, PortMapping,
    Protocol,
};
pub use state::{ContainerState, LifecycleReport, LifecycleStep, Operation, StepOutcome, StepRecord};

use crate::executor::{ExecutionResult, ExecutorError};
use crate::supervisor::{CommandFailed, SupervisorError};
use crate::template::RenderError;
use crate::unit::UnitError;

/// Container lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Expected directory, config file or unit is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// The container configuration is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Template rendering failed
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// The unit generator rejected a descriptor
    #[error("Validation error: {unit} rejected (exit code {}): {}", .result.exit_code, .result.stderr.trim())]
    Validation {
        /// Unit file name
        unit: String,
        /// Dry-run outcome
        result: ExecutionResult,
    },

    /// An external command ran and exited non-zero
    #[error("Execution error: {0}")]
    Execution(#[from] CommandFailed),

    /// An external command could not be launched or timed out
    #[error("Execution error: {0}")]
    Executor(#[from] ExecutorError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed `config.json`
    #[error("Invalid config.json: {0}")]
    Json(#[from] serde_json::Error),

    /// A lifecycle step failed; the transition was aborted there
    #[error("Step '{step}' failed: {source}")]
    Step {
        /// The failing step
        step: LifecycleStep,
        /// What went wrong
        #[source]
        source: Box<ContainerError>,
    },
}

impl ContainerError {
    /// The failing step, if this error came out of a lifecycle transition
    pub fn step(&self) -> Option<LifecycleStep> {
        match self {
            ContainerError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The originating error, unwrapping the step tag
    pub fn root(&self) -> &ContainerError {
        match self {
            ContainerError::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<UnitError> for ContainerError {
    fn from(error: UnitError) -> Self {
        match error {
            UnitError::Render(e) => ContainerError::Render(e),
            UnitError::Validation { unit, result } => ContainerError::Validation { unit, result },
            UnitError::Executor(e) => ContainerError::Executor(e),
            UnitError::Io { path, source } => ContainerError::IoError(std::io::Error::new(
                source.kind(),
                format!("{}: {}", path.display(), source),
            )),
        }
    }
}

impl From<SupervisorError> for ContainerError {
    fn from(error: SupervisorError) -> Self {
        match error {
            SupervisorError::Executor(e) => ContainerError::Executor(e),
            SupervisorError::Failed(e) => ContainerError::Execution(e),
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
