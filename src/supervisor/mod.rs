//! Service supervisor adapter.
//!
//! Thin, named wrappers over `systemctl`. Each operation issues exactly one
//! command through the [`CommandExecutor`] and hands back the raw
//! [`ExecutionResult`]; nothing retries. The supervisor is shared, external
//! state, and this adapter is the only path the orchestrator uses to reach it.

use crate::executor::{
    CommandExecutor, ExecutionCommand, ExecutionResult, ExecutorError, PrivilegeMode,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Supervisor control binary
pub const SYSTEMCTL: &str = "systemctl";

/// A supervisor command that ran but exited non-zero
#[derive(Debug, thiserror::Error)]
#[error("'{command}' exited with code {}: {}", .result.exit_code, .result.stderr.trim())]
pub struct CommandFailed {
    /// Command line that failed
    pub command: String,
    /// Raw outcome
    pub result: ExecutionResult,
}

/// Errors from checked supervisor operations
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The command could not be run
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// The command ran and failed
    #[error(transparent)]
    Failed(#[from] CommandFailed),
}

/// Adapter over a systemd instance
#[derive(Clone)]
pub struct SystemdSupervisor {
    executor: Arc<dyn CommandExecutor>,
    privilege: PrivilegeMode,
    timeout: Option<Duration>,
}

impl SystemdSupervisor {
    /// Create an adapter issuing commands through `executor`
    pub fn new(executor: Arc<dyn CommandExecutor>, privilege: PrivilegeMode) -> Self {
        Self {
            executor,
            privilege,
            timeout: None,
        }
    }

    /// Set a per-command timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command<I, S>(&self, args: I) -> ExecutionCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privilege
            .apply(ExecutionCommand::new(SYSTEMCTL, args))
            .with_optional_timeout(self.timeout)
    }

    async fn run(&self, command: ExecutionCommand) -> Result<ExecutionResult, ExecutorError> {
        debug!("Supervisor: {}", command.display());
        self.executor.execute(command).await
    }

    /// `systemctl daemon-reload`
    pub async fn reload(&self) -> Result<ExecutionResult, ExecutorError> {
        self.run(self.command(["daemon-reload"])).await
    }

    /// `systemctl enable <unit file>`, creating the auto-start linkage
    pub async fn enable(&self, unit_path: &Path) -> Result<ExecutionResult, ExecutorError> {
        self.run(self.command(["enable".to_string(), unit_path.display().to_string()]))
            .await
    }

    /// `systemctl start <unit>`
    pub async fn start(&self, unit: &str) -> Result<ExecutionResult, ExecutorError> {
        self.run(self.command(["start", unit])).await
    }

    /// `systemctl stop <unit>`
    pub async fn stop(&self, unit: &str) -> Result<ExecutionResult, ExecutorError> {
        self.run(self.command(["stop", unit])).await
    }

    /// `systemctl disable <unit>`
    pub async fn disable(&self, unit: &str) -> Result<ExecutionResult, ExecutorError> {
        self.run(self.command(["disable", unit])).await
    }

    /// `systemctl is-active --quiet <unit>`; exit code 0 means active.
    ///
    /// Read-only, so it is issued without privilege escalation.
    pub async fn is_active(&self, unit: &str) -> Result<bool, ExecutorError> {
        let command = ExecutionCommand::new(SYSTEMCTL, ["is-active", "--quiet", unit])
            .with_optional_timeout(self.timeout);
        Ok(self.run(command).await?.success())
    }

    /// Like [`reload`](Self::reload) but a non-zero exit is an error
    pub async fn reload_checked(&self) -> Result<ExecutionResult, SupervisorError> {
        let command = self.command(["daemon-reload"]);
        self.run_checked(command).await
    }

    /// Like [`enable`](Self::enable) but a non-zero exit is an error
    pub async fn enable_checked(&self, unit_path: &Path) -> Result<ExecutionResult, SupervisorError> {
        let command = self.command(["enable".to_string(), unit_path.display().to_string()]);
        self.run_checked(command).await
    }

    /// Like [`start`](Self::start) but a non-zero exit is an error
    pub async fn start_checked(&self, unit: &str) -> Result<ExecutionResult, SupervisorError> {
        let command = self.command(["start", unit]);
        let result = self.run_checked(command).await?;
        info!("Started {}", unit);
        Ok(result)
    }

    async fn run_checked(&self, command: ExecutionCommand) -> Result<ExecutionResult, SupervisorError> {
        let display = command.display();
        let result = self.run(command).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(CommandFailed {
                command: display,
                result,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        exit_code: i32,
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandExecutor for Recorder {
        async fn execute(&self, command: ExecutionCommand) -> Result<ExecutionResult, ExecutorError> {
            self.commands.lock().unwrap().push(command.display());
            Ok(ExecutionResult {
                stdout: String::new(),
                stderr: "Unit not found.".to_string(),
                exit_code: self.exit_code,
                duration: Duration::ZERO,
            })
        }

        fn executor_type(&self) -> &'static str {
            "recorder"
        }
    }

    fn supervisor(exit_code: i32, privilege: PrivilegeMode) -> (SystemdSupervisor, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            exit_code,
            commands: Mutex::new(Vec::new()),
        });
        (SystemdSupervisor::new(recorder.clone(), privilege), recorder)
    }

    #[tokio::test]
    async fn test_operations_issue_one_command_each() {
        let (supervisor, recorder) = supervisor(0, PrivilegeMode::Sudo);

        supervisor.reload().await.unwrap();
        supervisor
            .enable(Path::new("/etc/containers/systemd/overlay-net1.service"))
            .await
            .unwrap();
        supervisor.start("web1.service").await.unwrap();
        supervisor.stop("web1.service").await.unwrap();
        supervisor.disable("overlay-net1.service").await.unwrap();

        let commands = recorder.commands.lock().unwrap();
        assert_eq!(
            *commands,
            vec![
                "sudo systemctl daemon-reload",
                "sudo systemctl enable /etc/containers/systemd/overlay-net1.service",
                "sudo systemctl start web1.service",
                "sudo systemctl stop web1.service",
                "sudo systemctl disable overlay-net1.service",
            ]
        );
    }

    #[tokio::test]
    async fn test_raw_operations_surface_failures_without_error() {
        let (supervisor, recorder) = supervisor(5, PrivilegeMode::None);

        let result = supervisor.stop("web1.service").await.unwrap();
        assert_eq!(result.exit_code, 5);
        // No internal retry
        assert_eq!(recorder.commands.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checked_operation_fails_on_nonzero_exit() {
        let (supervisor, _) = supervisor(5, PrivilegeMode::None);

        let err = supervisor.start_checked("web1.service").await.unwrap_err();
        match err {
            SupervisorError::Failed(failed) => {
                assert_eq!(failed.command, "systemctl start web1.service");
                assert_eq!(failed.result.exit_code, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_is_active_is_unprivileged() {
        let (supervisor, recorder) = supervisor(3, PrivilegeMode::Sudo);

        assert!(!supervisor.is_active("overlay-net1.service").await.unwrap());
        assert_eq!(
            recorder.commands.lock().unwrap()[0],
            "systemctl is-active --quiet overlay-net1.service"
        );
    }
}
