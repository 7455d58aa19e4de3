//! Commands that run inside a container.
//!
//! Rather than talking to a runtime API, the orchestrator composes a
//! `<runtime> exec` invocation and runs it like any other host command.

use super::ExecutionCommand;

/// Compose `<runtime> exec [-i] <container> <program> <args...>`.
///
/// Interactivity (`-i`) is requested only when the command carries
/// non-empty stdin; the input, working directory, environment and timeout
/// of `command` are kept on the outer invocation.
pub fn container_exec(runtime: &str, container: &str, command: ExecutionCommand) -> ExecutionCommand {
    let mut args = vec!["exec".to_string()];
    if command.has_input() {
        args.push("-i".to_string());
    }
    args.push(container.to_string());
    args.push(command.program);
    args.extend(command.args);

    ExecutionCommand {
        program: runtime.to_string(),
        args,
        ..command
    }
}
