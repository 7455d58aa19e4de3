//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `start`: Start a container
//! - `stop`: Stop a container and tear down an unused overlay network
//! - `create-network`: Create the overlay network a container references
//! - `delete-network`: Delete the network namespace a container references
//! - `status`: Show the observed lifecycle state of a container
//! - `dump`: Print a container's configuration
//! - `render`: Print the container unit without installing it
//! - `exec`: Run a command inside a container or in its directory
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Lifecycle(LifecycleConfig),
    Exec(ExecConfig),
    ShowConfig { config_override: Option<PathBuf> },
}

/// Operation requested against a single container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    CreateNetwork,
    DeleteNetwork,
    Status,
    Dump,
    Render,
}

#[derive(Debug, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub action: LifecycleAction,
    pub name: String,
    pub config_override: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ExecConfig {
    pub name: String,
    pub command: Vec<String>,
    pub on_host: bool,
    pub config_override: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(name = "podnet")]
#[command(author = "Podnet Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Container and overlay network lifecycle through Quadlet units and systemd")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a container
    Start {
        /// Container name
        name: String,
    },
    /// Stop a container
    Stop {
        /// Container name
        name: String,
    },
    /// Create the overlay network referenced by a container
    CreateNetwork {
        /// Container name
        name: String,
    },
    /// Delete the network namespace referenced by a container
    DeleteNetwork {
        /// Container name
        name: String,
    },
    /// Show the lifecycle state of a container
    Status {
        /// Container name
        name: String,
    },
    /// Print a container's configuration as JSON
    Dump {
        /// Container name
        name: String,
    },
    /// Print the rendered container unit without installing it
    Render {
        /// Container name
        name: String,
    },
    /// Run a command inside a container
    Exec {
        /// Container name
        name: String,
        /// Run on the host, in the container's directory
        #[arg(long = "host")]
        host: bool,
        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        let lifecycle = |action: LifecycleAction, name: &String| -> Result<ExecutionMode, String> {
            Ok(ExecutionMode::Lifecycle(LifecycleConfig {
                action,
                name: name.clone(),
                config_override: self.config.clone(),
            }))
        };

        match &self.command {
            Some(Commands::Start { name }) => lifecycle(LifecycleAction::Start, name),
            Some(Commands::Stop { name }) => lifecycle(LifecycleAction::Stop, name),
            Some(Commands::CreateNetwork { name }) => lifecycle(LifecycleAction::CreateNetwork, name),
            Some(Commands::DeleteNetwork { name }) => lifecycle(LifecycleAction::DeleteNetwork, name),
            Some(Commands::Status { name }) => lifecycle(LifecycleAction::Status, name),
            Some(Commands::Dump { name }) => lifecycle(LifecycleAction::Dump, name),
            Some(Commands::Render { name }) => lifecycle(LifecycleAction::Render, name),
            Some(Commands::Exec {
                name,
                host,
                command,
            }) => {
                if command.is_empty() {
                    return Err("exec requires a command to run".to_string());
                }
                Ok(ExecutionMode::Exec(ExecConfig {
                    name: name.clone(),
                    command: command.clone(),
                    on_host: *host,
                    config_override: self.config.clone(),
                }))
            }
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig {
                config_override: self.config.clone(),
            }),
            None => Err(
                "No command specified. Use 'podnet --help' to see available commands.".to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_commands() {
        let cases = [
            (Commands::Start { name: "web1".into() }, LifecycleAction::Start),
            (Commands::Stop { name: "web1".into() }, LifecycleAction::Stop),
            (Commands::CreateNetwork { name: "web1".into() }, LifecycleAction::CreateNetwork),
            (Commands::DeleteNetwork { name: "web1".into() }, LifecycleAction::DeleteNetwork),
            (Commands::Status { name: "web1".into() }, LifecycleAction::Status),
            (Commands::Dump { name: "web1".into() }, LifecycleAction::Dump),
            (Commands::Render { name: "web1".into() }, LifecycleAction::Render),
        ];

        for (command, expected) in cases {
            let args = Args {
                config: None,
                command: Some(command),
            };
            match args.mode().unwrap() {
                ExecutionMode::Lifecycle(config) => {
                    assert_eq!(config.action, expected);
                    assert_eq!(config.name, "web1");
                }
                other => panic!("Expected Lifecycle mode, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_config_override_is_carried() {
        let args = Args {
            config: Some(PathBuf::from("/etc/podnet/test.toml")),
            command: Some(Commands::Start { name: "web1".into() }),
        };

        if let ExecutionMode::Lifecycle(config) = args.mode().unwrap() {
            assert_eq!(config.config_override, Some(PathBuf::from("/etc/podnet/test.toml")));
        } else {
            panic!("Expected Lifecycle mode");
        }
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from(["podnet", "create-network", "web1", "--config", "x.toml"])
            .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(args.command, Some(Commands::CreateNetwork { ref name }) if name == "web1"));
    }

    #[test]
    fn test_exec_command() {
        let args =
            Args::try_parse_from(["podnet", "exec", "web1", "--", "ls", "-la", "/data"]).unwrap();

        match args.mode().unwrap() {
            ExecutionMode::Exec(config) => {
                assert_eq!(config.name, "web1");
                assert_eq!(config.command, vec!["ls", "-la", "/data"]);
                assert!(!config.on_host);
            }
            other => panic!("Expected Exec mode, got {:?}", other),
        }
    }

    #[test]
    fn test_exec_on_host() {
        let args = Args::try_parse_from(["podnet", "exec", "--host", "web1", "pwd"]).unwrap();

        if let ExecutionMode::Exec(config) = args.mode().unwrap() {
            assert!(config.on_host);
            assert_eq!(config.command, vec!["pwd"]);
        } else {
            panic!("Expected Exec mode");
        }
    }

    #[test]
    fn test_show_config() {
        let args = Args {
            config: None,
            command: Some(Commands::ShowConfig),
        };
        assert_eq!(
            args.mode().unwrap(),
            ExecutionMode::ShowConfig {
                config_override: None
            }
        );
    }

    #[test]
    fn test_no_command_error() {
        let args = Args {
            config: None,
            command: None,
        };
        assert!(args.mode().is_err());
    }
}
