//! Container identity and desired state, loaded from `config.json`.

use super::{ContainerError, Result};
use crate::env;
use ipnetwork::Ipv4Network;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Largest VXLAN network identifier (24 bits)
pub const MAX_VXLAN_ID: u32 = (1 << 24) - 1;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("identifier pattern is valid"));

static MAC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("mac pattern is valid")
});

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env name pattern is valid"));

/// Host names and addresses; peers are written into a shell script
static PEER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$").expect("peer pattern is valid"));

/// Reject values that could end a unit line early
fn single_line(field: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(ContainerError::ConfigError(format!(
            "{} contains control characters: {:?}",
            field, value
        )));
    }
    Ok(())
}

/// Reject values that must be one unquoted unit word
fn single_word(field: &str, value: &str) -> Result<()> {
    single_line(field, value)?;
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(ContainerError::ConfigError(format!(
            "{} must be a single non-empty word: {:?}",
            field, value
        )));
    }
    Ok(())
}

/// `KEY=VALUE` as a unit `Environment=` assignment.
///
/// Values with whitespace, quotes or backslashes are double-quoted with
/// systemd escaping so the assignment stays one word.
pub fn environment_assignment(key: &str, value: &str) -> String {
    let assignment = format!("{}={}", key, value);
    if !assignment
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'))
    {
        return assignment;
    }

    let mut quoted = String::with_capacity(assignment.len() + 2);
    quoted.push('"');
    for c in assignment.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// A bind mount
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    /// Host directory; created before start if absent
    pub source: PathBuf,
    /// Path inside the container
    pub destination: String,
    /// Mount options such as `ro` or `rw,z`
    #[serde(default)]
    pub options: String,
}

impl Mount {
    /// Unit form: `source:destination:options`
    pub fn to_unit_string(&self) -> String {
        if self.options.is_empty() {
            format!("{}:{}", self.source.display(), self.destination)
        } else {
            format!("{}:{}:{}", self.source.display(), self.destination, self.options)
        }
    }
}

/// Transport protocol of a published port
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (default)
    #[default]
    Tcp,
    /// UDP
    Udp,
    /// SCTP
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        })
    }
}

/// A published port
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    /// Host address to bind
    #[serde(default = "default_host_ip")]
    pub host_ip: String,
    /// Host port
    pub host_port: u16,
    /// Container port
    pub container_port: u16,
    /// Protocol
    #[serde(default)]
    pub protocol: Protocol,
}

fn default_host_ip() -> String {
    "0.0.0.0".to_string()
}

impl PortMapping {
    /// Unit form: `hostIP:hostPort:containerPort/protocol`
    pub fn to_unit_string(&self) -> String {
        format!(
            "{}:{}:{}/{}",
            self.host_ip, self.host_port, self.container_port, self.protocol
        )
    }
}

/// The container's place in an overlay network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkIdentity {
    /// Network namespace; also identifies the overlay network service
    pub namespace: String,
    /// VXLAN network identifier
    pub vxlan_id: u32,
    /// Overlay subnet, e.g. `10.0.0.0/24`
    pub subnet_cidr_block: Ipv4Network,
    /// Container address inside the subnet
    pub ip_address: Ipv4Addr,
    /// Container interface MAC address
    pub mac_address: String,
    /// Remote endpoints participating in the overlay
    #[serde(default)]
    pub peers: Vec<String>,
}

impl NetworkIdentity {
    /// Prefix length of the subnet, used as the interface netmask
    pub fn netmask(&self) -> u8 {
        self.subnet_cidr_block.prefix()
    }
}

/// Schema of `config.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Image reference
    pub image: String,
    /// Bind mounts, in order
    #[serde(default)]
    pub mounts: Vec<Mount>,
    /// Published ports
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Environment; rendered sorted by name
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    /// Overlay network identity
    pub network: NetworkIdentity,
}

impl ContainerConfig {
    /// Check the fields that flow into file names, unit names and commands
    pub fn validate(&self) -> Result<()> {
        single_word("image", &self.image)?;

        let network = &self.network;
        if !IDENTIFIER.is_match(&network.namespace) {
            return Err(ContainerError::ConfigError(format!(
                "invalid network namespace '{}'",
                network.namespace
            )));
        }
        if network.vxlan_id > MAX_VXLAN_ID {
            return Err(ContainerError::ConfigError(format!(
                "vxlan_id {} exceeds {}",
                network.vxlan_id, MAX_VXLAN_ID
            )));
        }
        if !network.subnet_cidr_block.contains(network.ip_address) {
            return Err(ContainerError::ConfigError(format!(
                "ip_address {} is outside subnet {}",
                network.ip_address, network.subnet_cidr_block
            )));
        }
        if !MAC_ADDRESS.is_match(&network.mac_address) {
            return Err(ContainerError::ConfigError(format!(
                "invalid mac_address '{}'",
                network.mac_address
            )));
        }

        for peer in &network.peers {
            if !PEER.is_match(peer) {
                return Err(ContainerError::ConfigError(format!("invalid peer '{}'", peer)));
            }
        }

        for mount in &self.mounts {
            let source = mount.source.to_string_lossy();
            if !mount.source.is_absolute() || !mount.destination.starts_with('/') {
                return Err(ContainerError::ConfigError(format!(
                    "mount '{}' must use absolute paths",
                    mount.to_unit_string()
                )));
            }
            // `:` separates the fields of the unit's Volume= value
            for (field, value) in [
                ("mount source", source.as_ref()),
                ("mount destination", mount.destination.as_str()),
                ("mount options", mount.options.as_str()),
            ] {
                if value.contains(':') {
                    return Err(ContainerError::ConfigError(format!(
                        "{} must not contain ':': {:?}",
                        field, value
                    )));
                }
            }
            single_word("mount source", &source)?;
            single_word("mount destination", &mount.destination)?;
            if !mount.options.is_empty() {
                single_word("mount options", &mount.options)?;
            }
        }

        for port in &self.ports {
            single_word("port host_ip", &port.host_ip)?;
        }

        for (key, value) in &self.environment_variables {
            if !ENV_NAME.is_match(key) {
                return Err(ContainerError::ConfigError(format!(
                    "invalid environment variable name '{}'",
                    key
                )));
            }
            single_line(&format!("environment variable {}", key), value)?;
        }

        Ok(())
    }
}

/// Read-only snapshot handed to reporting layers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerSnapshot {
    /// Container name
    pub name: String,
    /// Parsed configuration
    pub config: ContainerConfig,
}

/// A container whose directory and `config.json` exist on disk
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    name: String,
    containers_dir: PathBuf,
    directory: PathBuf,
    config: ContainerConfig,
}

impl ContainerSpec {
    /// Load `<containers_dir>/<name>/config.json`.
    ///
    /// # Errors
    ///
    /// [`ContainerError::NotFound`] when the directory or config file is
    /// missing; [`ContainerError::Json`] or [`ContainerError::ConfigError`]
    /// when it does not describe a valid container.
    pub fn load(name: &str, containers_dir: &Path) -> Result<Self> {
        if !IDENTIFIER.is_match(name) {
            return Err(ContainerError::ConfigError(format!(
                "invalid container name '{}'",
                name
            )));
        }

        let directory = env::container_dir_path(containers_dir, name);
        let config_file = env::container_config_path(containers_dir, name);
        if !directory.is_dir() {
            return Err(ContainerError::NotFound(format!(
                "container directory {}",
                directory.display()
            )));
        }
        if !config_file.is_file() {
            return Err(ContainerError::NotFound(format!(
                "container config {}",
                config_file.display()
            )));
        }

        let content = std::fs::read_to_string(&config_file)?;
        let config: ContainerConfig = serde_json::from_str(&content)?;
        config.validate()?;

        Ok(Self {
            name: name.to_string(),
            containers_dir: containers_dir.to_path_buf(),
            directory,
            config,
        })
    }

    /// Stable identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-container directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the attach script
    pub fn attach_script(&self) -> PathBuf {
        env::attach_script_path(&self.containers_dir, &self.name)
    }

    /// Path of the peers script of the namespace this container joins
    pub fn peers_script(&self) -> PathBuf {
        env::peers_script_path(&self.containers_dir, &self.config.network.namespace)
    }

    /// Parsed configuration
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Network identity
    pub fn network(&self) -> &NetworkIdentity {
        &self.config.network
    }

    /// Mounts in unit form
    pub fn mounts(&self) -> Vec<String> {
        self.config.mounts.iter().map(Mount::to_unit_string).collect()
    }

    /// Ports in unit form
    pub fn ports(&self) -> Vec<String> {
        self.config.ports.iter().map(PortMapping::to_unit_string).collect()
    }

    /// Environment in `KEY=VALUE` form, sorted by key and quoted where needed
    pub fn environment_variables(&self) -> Vec<String> {
        self.config
            .environment_variables
            .iter()
            .map(|(key, value)| environment_assignment(key, value))
            .collect()
    }

    /// Snapshot for reporting
    pub fn dump(&self) -> ContainerSnapshot {
        ContainerSnapshot {
            name: self.name.clone(),
            config: self.config.clone(),
        }
    }
}
