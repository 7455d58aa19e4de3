//! # Command Execution Layer
//!
//! The only part of the crate that touches the operating system's process
//! table. Everything else describes *what* to run as an [`ExecutionCommand`]
//! and hands it to a [`CommandExecutor`].
//!
//! ## Core Components
//!
//! - **[`CommandExecutor`]**: async trait implemented by every executor
//! - **[`HostExecutor`]**: runs commands directly on the host via `tokio::process`
//! - **[`ExecutionCommand`]**: program, arguments, working directory, environment, stdin and timeout
//! - **[`ExecutionResult`]**: exit code, captured stdout/stderr and duration
//! - **[`container_exec`]**: composes an "exec inside container" invocation
//! - **[`PrivilegeMode`]**: privilege prefix applied by command builders
//!
//! ## Execution Flow
//!
//! ```text
//! ExecutionCommand
//!        ↓
//!   CommandExecutor::execute()
//!        ↓
//!   HostExecutor ── tokio::process::Command
//!        ↓
//!  ExecutionResult
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use podnet::executor::{CommandExecutor, ExecutionCommand, HostExecutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = HostExecutor::new();
//!
//!     let command = ExecutionCommand::shell("systemctl is-active overlay-net1.service");
//!     let result = executor.execute(command).await?;
//!     println!("exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Privilege configuration applied when building commands.
///
/// Defines [`PrivilegeMode`] which command builders use to prefix
/// commands that need elevated privilege.
pub mod config;

/// Host-based command execution.
///
/// Implements [`HostExecutor`] for direct process execution on the
/// host system using `tokio::process::Command`.
pub mod host;

/// Composition of commands that run inside a container.
pub mod container;

pub use config::PrivilegeMode;
pub use container::container_exec;
pub use host::HostExecutor;

/// Result of command execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Exit code (0 = success, non-zero = failure, -1 = terminated by signal)
    pub exit_code: i32,
    /// Duration of command execution
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the command executed successfully (exit code 0)
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command to execute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionCommand {
    /// Program name or path to execute
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Working directory for command execution
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set on top of the inherited environment
    pub env: BTreeMap<String, String>,
    /// Bytes streamed to the command's standard input
    pub stdin: Option<Vec<u8>>,
    /// Maximum execution time (None = no timeout)
    pub timeout: Option<Duration>,
}

impl ExecutionCommand {
    /// Create a new command with just program and args
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: BTreeMap::new(),
            stdin: None,
            timeout: None,
        }
    }

    /// Wrap a raw shell command line as `sh -c <line>`
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), line.into()])
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set standard input
    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Set execution timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the timeout only if one is given
    pub fn with_optional_timeout(mut self, timeout: Option<Duration>) -> Self {
        if timeout.is_some() {
            self.timeout = timeout;
        }
        self
    }

    /// Whether the command carries non-empty input
    pub fn has_input(&self) -> bool {
        self.stdin.as_ref().is_some_and(|input| !input.is_empty())
    }

    /// Shell-escaped one-line rendering, for logs and error messages
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, shell_escape::escape(value.as_str().into())))
            .collect();
        parts.push(shell_escape::escape(self.program.as_str().into()).into_owned());
        parts.extend(
            self.args
                .iter()
                .map(|arg| shell_escape::escape(arg.as_str().into()).into_owned()),
        );
        parts.join(" ")
    }
}

/// Errors during command execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The process could not be launched
    #[error("Failed to launch '{command}': {source}")]
    LaunchFailed {
        /// Command line that failed to launch
        command: String,
        /// Underlying launch error
        #[source]
        source: std::io::Error,
    },

    /// Command execution timed out
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// I/O error while talking to the child process
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Runs [`ExecutionCommand`]s somewhere and reports their outcome.
///
/// A non-zero exit is *not* an error at this layer: it is reported in the
/// [`ExecutionResult`] and classified by the caller.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command and return the result
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be launched or times out.
    async fn execute(&self, command: ExecutionCommand) -> Result<ExecutionResult, ExecutorError>;

    /// Check if the executor is available and healthy
    async fn health_check(&self) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Get executor type name for logging
    fn executor_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_wraps_line() {
        let cmd = ExecutionCommand::shell("echo hi");
        assert_eq!(cmd.program, "sh");
        assert_eq!(cmd.args, vec!["-c", "echo hi"]);
    }

    #[test]
    fn test_has_input() {
        let cmd = ExecutionCommand::new("cat", Vec::<String>::new());
        assert!(!cmd.has_input());
        assert!(!cmd.clone().with_stdin(Vec::new()).has_input());
        assert!(cmd.with_stdin("data").has_input());
    }

    #[test]
    fn test_display_escapes_arguments() {
        let cmd = ExecutionCommand::new("ip", ["netns", "delete", "my net"])
            .with_env("QUADLET_UNIT_DIRS", "/tmp/x");
        assert_eq!(
            cmd.display(),
            "QUADLET_UNIT_DIRS=/tmp/x ip netns delete 'my net'"
        );
    }

    #[test]
    fn test_optional_timeout() {
        let cmd = ExecutionCommand::shell("true").with_optional_timeout(None);
        assert!(cmd.timeout.is_none());

        let cmd = cmd.with_optional_timeout(Some(Duration::from_secs(3)));
        assert_eq!(cmd.timeout, Some(Duration::from_secs(3)));
    }
}
