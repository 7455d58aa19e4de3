//! Generated unit artifacts and their installation.
//!
//! A [`UnitArtifact`] is any file the orchestrator renders and installs:
//! the Quadlet container unit, the overlay network service, and the two
//! helper scripts. [`UnitWriter`] renders, validates and atomically installs
//! them.

use crate::executor::{ExecutionResult, ExecutorError};
use crate::template::RenderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

mod writer;

pub use writer::{ContainerUnitInstall, UnitWriter};

/// Kind of generated artifact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// `{name}.container`, consumed by the unit generator
    ContainerUnit,
    /// `overlay-{namespace}.service`
    NetworkUnit,
    /// Per-container `attach.sh`
    AttachScript,
    /// Per-namespace `peers.sh`
    PeersScript,
}

impl UnitKind {
    /// Scripts are installed executable
    pub fn is_script(&self) -> bool {
        matches!(self, UnitKind::AttachScript | UnitKind::PeersScript)
    }

    /// File mode used when installing this kind
    pub fn mode(&self) -> u32 {
        if self.is_script() { 0o755 } else { 0o644 }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitKind::ContainerUnit => "container unit",
            UnitKind::NetworkUnit => "network unit",
            UnitKind::AttachScript => "attach script",
            UnitKind::PeersScript => "peers script",
        };
        f.write_str(name)
    }
}

/// A rendered and installed file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitArtifact {
    /// What was installed
    pub kind: UnitKind,
    /// Final location
    pub path: PathBuf,
    /// Exact bytes written
    pub rendered_content: String,
}

/// Policy applied when the unit generator rejects a container unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Abort before installation (default)
    #[default]
    Strict,
    /// Log the failure and install anyway
    Permissive,
}

/// Errors while producing unit artifacts
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// Rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The unit generator rejected the descriptor
    #[error("Unit generator rejected {unit} (exit code {}): {}", .result.exit_code, .result.stderr.trim())]
    Validation {
        /// Unit file name
        unit: String,
        /// Dry-run outcome
        result: ExecutionResult,
    },

    /// The unit generator could not be run
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Filesystem error during installation or removal
    #[error("Unit IO error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}
