//! Orchestrator configuration.
//!
//! Every field has a default, so a configuration file only needs to name
//! what differs from a stock host layout:
//!
//! ```toml
//! containers_directory = "/srv/podnet/containers"
//! privilege = "none"
//! validation = "permissive"
//! command_timeout_secs = 60
//! ```

use crate::env;
use crate::executor::PrivilegeMode;
use crate::unit::ValidationPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for the lifecycle controller and its collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// One subdirectory per container, each holding `config.json`
    pub containers_directory: PathBuf,
    /// Directory the unit generator and supervisor read units from
    pub unit_directory: PathBuf,
    /// Unit generator binary used for dry-run validation
    pub unit_generator: PathBuf,
    /// Container runtime binary used for in-container execution
    pub container_runtime: String,
    /// How privileged commands are issued
    pub privilege: PrivilegeMode,
    /// What to do when the unit generator rejects a container unit
    pub validation: ValidationPolicy,
    /// Per-command timeout; unset means wait indefinitely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    /// Directory with `<id>.tmpl` files overriding the built-in templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_directory: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            containers_directory: PathBuf::from(env::defaults::CONTAINERS_DIRECTORY),
            unit_directory: PathBuf::from(env::defaults::UNIT_DIRECTORY),
            unit_generator: PathBuf::from(env::defaults::UNIT_GENERATOR),
            container_runtime: env::defaults::CONTAINER_RUNTIME.to_string(),
            privilege: PrivilegeMode::default(),
            validation: ValidationPolicy::default(),
            command_timeout_secs: None,
            template_directory: None,
        }
    }
}

impl OrchestratorConfig {
    /// Per-command timeout as a duration
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Point both state directories below `root`
    pub fn with_root(mut self, root: &Path) -> Self {
        self.containers_directory = root.join("containers");
        self.unit_directory = root.join("units");
        self
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Serialize configuration to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.unit_directory, PathBuf::from("/etc/containers/systemd"));
        assert_eq!(config.container_runtime, "podman");
        assert_eq!(config.privilege, PrivilegeMode::Sudo);
        assert_eq!(config.validation, ValidationPolicy::Strict);
        assert_eq!(config.command_timeout(), None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            containers_directory = "/srv/containers"
            privilege = "none"
            validation = "permissive"
            command_timeout_secs = 30
            "#,
        )
        .expect("Failed to parse partial config");

        assert_eq!(config.containers_directory, PathBuf::from("/srv/containers"));
        assert_eq!(config.unit_directory, PathBuf::from("/etc/containers/systemd"));
        assert_eq!(config.privilege, PrivilegeMode::None);
        assert_eq!(config.validation, ValidationPolicy::Permissive);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = OrchestratorConfig {
            template_directory: Some(PathBuf::from("/etc/podnet/templates")),
            command_timeout_secs: Some(5),
            ..OrchestratorConfig::default()
        };

        let toml_str = config.to_toml_string().expect("Failed to serialize");
        assert!(toml_str.contains("unit_generator"));
        assert!(toml_str.contains("privilege = \"sudo\""));

        let parsed = OrchestratorConfig::from_toml_str(&toml_str).expect("Failed to parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_toml_file_operations() {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let config = OrchestratorConfig::default().with_root(Path::new("/tmp/podnet-test"));

        config.to_toml_file(temp_file.path()).expect("Failed to save");
        let loaded = OrchestratorConfig::from_toml_file(temp_file.path()).expect("Failed to load");

        assert_eq!(loaded.containers_directory, PathBuf::from("/tmp/podnet-test/containers"));
        assert_eq!(loaded.unit_directory, PathBuf::from("/tmp/podnet-test/units"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(OrchestratorConfig::from_toml_str("privilege = \"root\"").is_err());
        assert!(OrchestratorConfig::from_toml_file("/nonexistent/podnet.toml").is_err());
    }
}
