//! Environment constants and path utilities for the orchestrator.
//!
//! This module centralizes the on-disk layout the orchestrator reads and
//! writes: the per-container directory holding `config.json` and the
//! attach script, the per-namespace directory holding the peers script,
//! and the unit directory consumed by the supervisor.

use std::path::{Path, PathBuf};

/// Main application directory name for user/local configuration
pub const PODNET_DIR_NAME: &str = ".podnet";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Local configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "podnet.toml";

/// Environment variable pointing at an explicit configuration file
pub const PODNET_CONFIG_ENV_VAR: &str = "PODNET_CONFIG";

/// Per-container file names
pub mod container {
    /// Declarative container configuration, read-only input
    pub const CONFIG_FILE_NAME: &str = "config.json";

    /// Script that attaches the container interface to its namespace
    pub const ATTACH_SCRIPT_NAME: &str = "attach.sh";
}

/// Per-namespace file names, shared by every container on the namespace
pub mod network {
    /// Directory under the containers directory holding one entry per
    /// namespace; hidden so it never parses as a container name
    pub const NETWORKS_DIR_NAME: &str = ".networks";

    /// Script that programs the overlay forwarding entries for peers
    pub const PEERS_SCRIPT_NAME: &str = "peers.sh";
}

/// Supervisor unit naming
pub mod unit {
    /// Extension of container units consumed by the unit generator
    pub const CONTAINER_UNIT_EXTENSION: &str = "container";

    /// Prefix of overlay network service units
    pub const NETWORK_SERVICE_PREFIX: &str = "overlay-";

    /// Extension of plain service units
    pub const SERVICE_EXTENSION: &str = "service";
}

/// Default filesystem locations
pub mod defaults {
    /// Default directory holding one subdirectory per container
    pub const CONTAINERS_DIRECTORY: &str = "/var/lib/podnet/containers";

    /// Default directory the supervisor loads generated units from
    pub const UNIT_DIRECTORY: &str = "/etc/containers/systemd";

    /// Default location of the Quadlet unit generator
    pub const UNIT_GENERATOR: &str = "/usr/lib/systemd/system-generators/podman-system-generator";

    /// Default container runtime used for `exec`
    pub const CONTAINER_RUNTIME: &str = "podman";

    /// System-wide configuration file
    pub const SYSTEM_CONFIG_FILE: &str = "/etc/podnet/config.toml";
}

/// Build a container's directory path
pub fn container_dir_path(containers_dir: &Path, name: &str) -> PathBuf {
    containers_dir.join(name)
}

/// Build a container's `config.json` path
pub fn container_config_path(containers_dir: &Path, name: &str) -> PathBuf {
    container_dir_path(containers_dir, name).join(container::CONFIG_FILE_NAME)
}

/// Build a container's attach script path
pub fn attach_script_path(containers_dir: &Path, name: &str) -> PathBuf {
    container_dir_path(containers_dir, name).join(container::ATTACH_SCRIPT_NAME)
}

/// Build a namespace's directory path
pub fn network_dir_path(containers_dir: &Path, namespace: &str) -> PathBuf {
    containers_dir.join(network::NETWORKS_DIR_NAME).join(namespace)
}

/// Build a namespace's peers script path
pub fn peers_script_path(containers_dir: &Path, namespace: &str) -> PathBuf {
    network_dir_path(containers_dir, namespace).join(network::PEERS_SCRIPT_NAME)
}

/// File name of a container unit, e.g. `web1.container`
pub fn container_unit_file_name(name: &str) -> String {
    format!("{}.{}", name, unit::CONTAINER_UNIT_EXTENSION)
}

/// Build the installed container unit path
pub fn container_unit_path(unit_dir: &Path, name: &str) -> PathBuf {
    unit_dir.join(container_unit_file_name(name))
}

/// Service name the generator derives from a container unit
pub fn container_service_name(name: &str) -> String {
    format!("{}.{}", name, unit::SERVICE_EXTENSION)
}

/// Service name of the overlay network for a namespace, e.g. `overlay-net1.service`
pub fn network_service_name(namespace: &str) -> String {
    format!(
        "{}{}.{}",
        unit::NETWORK_SERVICE_PREFIX,
        namespace,
        unit::SERVICE_EXTENSION
    )
}

/// Build the installed network unit path
pub fn network_unit_path(unit_dir: &Path, namespace: &str) -> PathBuf {
    unit_dir.join(network_service_name(namespace))
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(PODNET_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(PODNET_DIR_NAME).join(CONFIG_FILE_NAME)
}
