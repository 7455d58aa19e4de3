//! Overlay network aggregate.
//!
//! An overlay network is identified by its namespace, not by any container.
//! Several containers may reference the same namespace; they share one
//! `overlay-<namespace>.service` and one peers script, so the rendered unit
//! is the same whichever container asks for the network.

use super::spec::{ContainerConfig, ContainerSpec};
use crate::env;
use crate::template::Bindings;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One overlay network, derived from a container's network identity
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayNetwork {
    namespace: String,
    vxlan_id: u32,
    subnet_cidr_block: String,
    peers: Vec<String>,
    peers_script: PathBuf,
    unit_path: PathBuf,
}

impl OverlayNetwork {
    /// Derive the network referenced by `spec`
    pub fn from_spec(spec: &ContainerSpec, unit_dir: &Path) -> Self {
        let network = spec.network();
        Self {
            namespace: network.namespace.clone(),
            vxlan_id: network.vxlan_id,
            subnet_cidr_block: network.subnet_cidr_block.to_string(),
            peers: network.peers.clone(),
            peers_script: spec.peers_script(),
            unit_path: env::network_unit_path(unit_dir, &network.namespace),
        }
    }

    /// Namespace, the network's identity
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Supervisor service name
    pub fn service_name(&self) -> String {
        env::network_service_name(&self.namespace)
    }

    /// Installed unit path
    pub fn unit_path(&self) -> &Path {
        &self.unit_path
    }

    /// Peers script path
    pub fn peers_script(&self) -> &Path {
        &self.peers_script
    }

    /// Bindings for the peers script
    pub fn peers_bindings(&self) -> Bindings {
        Bindings::new()
            .scalar("namespace", &self.namespace)
            .scalar("network", &self.namespace)
            .scalar("vxlan_id", self.vxlan_id)
            .list("peers", self.peers.iter().cloned())
    }

    /// Bindings for the network unit
    pub fn unit_bindings(&self) -> Bindings {
        Bindings::new()
            .scalar("namespace", &self.namespace)
            .scalar("network", &self.namespace)
            .scalar("vxlan_id", self.vxlan_id)
            .scalar("subnet_cidr_block", &self.subnet_cidr_block)
            .path("peers_script", &self.peers_script)
    }
}

/// Containers other than `except` that reference `namespace` and still
/// have an installed container unit.
///
/// Unreadable or invalid configurations are skipped with a warning.
pub fn network_users(
    containers_dir: &Path,
    unit_dir: &Path,
    namespace: &str,
    except: &str,
) -> std::io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(containers_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut users = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == except || !entry.path().is_dir() {
            continue;
        }

        let config_path = env::container_config_path(containers_dir, &name);
        let config: ContainerConfig = match std::fs::read_to_string(&config_path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(config) => config,
            Err(e) if config_path.exists() => {
                warn!("Ignoring {}: {}", config_path.display(), e);
                continue;
            }
            Err(_) => continue,
        };

        if config.network.namespace == namespace && env::container_unit_path(unit_dir, &name).exists() {
            debug!("Namespace {} is in use by {}", namespace, name);
            users.push(name);
        }
    }

    users.sort();
    Ok(users)
}
