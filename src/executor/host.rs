//! Native host command execution.
//!
//! Executes commands directly on the host system using `tokio::process::Command`.

use super::{CommandExecutor, ExecutionCommand, ExecutionResult, ExecutorError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tracing::debug;

/// Executes commands directly on the host system
#[derive(Debug, Clone)]
pub struct HostExecutor;

impl HostExecutor {
    /// Create a new host executor
    pub fn new() -> Self {
        Self
    }
}

impl Default for HostExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for HostExecutor {
    async fn execute(&self, cmd: ExecutionCommand) -> Result<ExecutionResult, ExecutorError> {
        let command_line = cmd.display();
        debug!(command = %command_line, "Executing command on host");

        let start = Instant::now();

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = cmd.working_dir {
            command.current_dir(dir);
        }

        for (key, value) in &cmd.env {
            command.env(key, value);
        }

        // No input means no pipe: the child sees EOF immediately
        let input = cmd.stdin.filter(|bytes| !bytes.is_empty());
        command.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = command
            .spawn()
            .map_err(|source| ExecutorError::LaunchFailed {
                command: command_line.clone(),
                source,
            })?;

        // Feed stdin while the pipes drain, so a child echoing its input
        // cannot fill stdout and stall the write
        let stdin = child.stdin.take();
        let exchange = async move {
            let (fed, output) = tokio::join!(feed_stdin(stdin, input), child.wait_with_output());
            fed?;
            output
        };

        // Dropping the exchange kills the child
        let output = match cmd.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| ExecutorError::Timeout(timeout))??,
            None => exchange.await?,
        };

        let duration = start.elapsed();

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration,
        })
    }

    fn executor_type(&self) -> &'static str {
        "host"
    }
}

/// Write `input` to the child and close the pipe.
///
/// A child that exits without reading all of it closes its end first;
/// the resulting `BrokenPipe` is not an error, the exit status tells.
async fn feed_stdin(pipe: Option<ChildStdin>, input: Option<Vec<u8>>) -> std::io::Result<()> {
    let (Some(mut pipe), Some(bytes)) = (pipe, input) else {
        return Ok(());
    };

    let written = match pipe.write_all(&bytes).await {
        Ok(()) => pipe.shutdown().await,
        Err(e) => Err(e),
    };
    match written {
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!("Child closed stdin after accepting part of {} bytes", bytes.len());
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_host_executor_simple_command() {
        let executor = HostExecutor::new();

        let cmd = ExecutionCommand::new("echo", ["hello"]);

        let result = executor.execute(cmd).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_host_executor_shell_line() {
        let executor = HostExecutor::new();

        let result = executor
            .execute(ExecutionCommand::shell("echo oops >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(result.stderr.contains("oops"));
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_host_executor_working_directory() {
        let executor = HostExecutor::new();

        let cmd = ExecutionCommand::new("pwd", Vec::<String>::new()).with_working_dir("/tmp");

        let result = executor.execute(cmd).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("/tmp"));
    }

    #[tokio::test]
    async fn test_host_executor_environment_variable() {
        let executor = HostExecutor::new();

        let cmd = ExecutionCommand::shell("echo $TEST_VAR").with_env("TEST_VAR", "hello");

        let result = executor.execute(cmd).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_host_executor_pipes_stdin() {
        let executor = HostExecutor::new();

        let cmd = ExecutionCommand::new("cat", Vec::<String>::new()).with_stdin("piped input");

        let result = executor.execute(cmd).await.unwrap();
        assert_eq!(result.stdout, "piped input");
    }

    #[tokio::test]
    async fn test_host_executor_without_stdin_does_not_block() {
        let executor = HostExecutor::new();

        // `cat` would hang forever on an open, unwritten pipe
        let cmd = ExecutionCommand::new("cat", Vec::<String>::new())
            .with_timeout(Duration::from_secs(5));

        let result = executor.execute(cmd).await.unwrap();
        assert!(result.success());
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_host_executor_large_stdin_echoed_back() {
        let executor = HostExecutor::new();

        // Far beyond a pipe buffer in both directions
        let input = vec![b'x'; 1024 * 1024];
        let cmd = ExecutionCommand::new("cat", Vec::<String>::new())
            .with_stdin(input.clone())
            .with_timeout(Duration::from_secs(3));

        let result = tokio::time::timeout(Duration::from_secs(10), executor.execute(cmd))
            .await
            .expect("execute must return within its own timeout")
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.len(), input.len());
    }

    #[tokio::test]
    async fn test_host_executor_child_ignoring_stdin() {
        let executor = HostExecutor::new();

        // `true` exits without reading; the write side sees a closed pipe
        let cmd = ExecutionCommand::new("true", Vec::<String>::new())
            .with_stdin(vec![b'x'; 1024 * 1024])
            .with_timeout(Duration::from_secs(5));

        let result = executor.execute(cmd).await.unwrap();
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_host_executor_timeout_covers_stdin() {
        let executor = HostExecutor::new();

        // Never reads stdin, never exits on its own
        let cmd = ExecutionCommand::new("sleep", ["30"])
            .with_stdin(vec![b'x'; 1024 * 1024])
            .with_timeout(Duration::from_millis(200));

        let result = tokio::time::timeout(Duration::from_secs(10), executor.execute(cmd))
            .await
            .expect("timeout must cover the stdin exchange");
        assert!(matches!(result.unwrap_err(), ExecutorError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_host_executor_timeout() {
        let executor = HostExecutor::new();

        let cmd = ExecutionCommand::new("sleep", ["2"]).with_timeout(Duration::from_millis(100));

        let result = executor.execute(cmd).await;
        assert!(matches!(result.unwrap_err(), ExecutorError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_host_executor_launch_failure() {
        let executor = HostExecutor::new();

        let cmd = ExecutionCommand::new("/nonexistent/podnet-binary", Vec::<String>::new());

        let result = executor.execute(cmd).await;
        assert!(matches!(
            result.unwrap_err(),
            ExecutorError::LaunchFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_host_executor_type() {
        let executor = HostExecutor::new();
        assert_eq!(executor.executor_type(), "host");
        assert!(executor.health_check().await.is_ok());
    }
}
