//! Privilege configuration for command builders.
//!
//! The executor never escalates on its own; callers that build commands
//! needing root wrap them with [`PrivilegeMode::apply`].

use super::ExecutionCommand;
use serde::{Deserialize, Serialize};

/// How privileged commands are issued
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeMode {
    /// Run commands as the current user (already root, or rootless setups)
    None,

    /// Prefix privileged commands with `sudo` (default)
    #[default]
    Sudo,
}

impl PrivilegeMode {
    /// Check if commands are prefixed with sudo
    pub fn is_sudo(&self) -> bool {
        matches!(self, PrivilegeMode::Sudo)
    }

    /// Wrap a command so it runs with the configured privilege.
    ///
    /// Environment variables are passed to sudo explicitly as `KEY=VALUE`
    /// arguments so they survive its environment reset.
    pub fn apply(&self, command: ExecutionCommand) -> ExecutionCommand {
        match self {
            PrivilegeMode::None => command,
            PrivilegeMode::Sudo => {
                let mut args: Vec<String> = command
                    .env
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value))
                    .collect();
                args.push(command.program);
                args.extend(command.args);

                ExecutionCommand {
                    program: "sudo".to_string(),
                    args,
                    env: Default::default(),
                    ..command
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_mode_default() {
        let mode = PrivilegeMode::default();
        assert!(mode.is_sudo());
    }

    #[test]
    fn test_none_leaves_command_untouched() {
        let cmd = ExecutionCommand::new("systemctl", ["daemon-reload"]);
        assert_eq!(PrivilegeMode::None.apply(cmd.clone()), cmd);
    }

    #[test]
    fn test_sudo_prefixes_command() {
        let cmd = ExecutionCommand::new("systemctl", ["start", "web1.service"])
            .with_working_dir("/srv/web1");
        let wrapped = PrivilegeMode::Sudo.apply(cmd);

        assert_eq!(wrapped.program, "sudo");
        assert_eq!(wrapped.args, vec!["systemctl", "start", "web1.service"]);
        assert_eq!(wrapped.working_dir.as_deref(), Some(std::path::Path::new("/srv/web1")));
    }

    #[test]
    fn test_sudo_forwards_environment() {
        let cmd = ExecutionCommand::new("/usr/lib/gen", ["-dryrun"]).with_env("QUADLET_UNIT_DIRS", "/tmp/u");
        let wrapped = PrivilegeMode::Sudo.apply(cmd);

        assert_eq!(wrapped.args, vec!["QUADLET_UNIT_DIRS=/tmp/u", "/usr/lib/gen", "-dryrun"]);
        assert!(wrapped.env.is_empty());
    }

    #[test]
    fn test_privilege_mode_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            privilege: PrivilegeMode,
        }

        let parsed: Wrapper = toml::from_str("privilege = \"none\"").unwrap();
        assert_eq!(parsed.privilege, PrivilegeMode::None);
    }
}
