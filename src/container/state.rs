//! Lifecycle states, tagged steps and per-operation reports.

use super::{ContainerError, Result};
use crate::executor::ExecutionResult;
use crate::unit::UnitArtifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Observed state of a container identity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// No directory or `config.json`
    Absent,
    /// Configuration present, nothing installed
    Configured,
    /// Overlay network service active, container not installed
    NetworkReady,
    /// Container unit installed and its service active
    Running,
    /// Container unit installed but its service inactive
    Stopped,
}

/// Lifecycle operation a report belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Start the container
    Start,
    /// Stop the container and tear down its network
    Stop,
    /// Install and start the overlay network service
    CreateOverlayNetwork,
    /// Delete the network namespace
    DeleteOverlayNetwork,
}

/// Idempotent, independently retryable steps of the lifecycle transitions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStep {
    /// Create missing mount source directories
    EnsureDirectories,
    /// Render the attach script
    EnsureAttachScript,
    /// Render, validate and install the container unit
    EnsureUnitInstalled,
    /// Reload the supervisor
    EnsureReloaded,
    /// Start the container service
    EnsureStarted,
    /// Render the peers script
    EnsurePeersScript,
    /// Render and install the network unit
    EnsureNetworkUnit,
    /// Enable the network unit
    EnsureEnabled,
    /// Start the network service
    EnsureNetworkStarted,
    /// Stop the container service
    StopContainer,
    /// Remove the installed container unit
    RemoveContainerUnit,
    /// Stop the network service
    StopNetwork,
    /// Disable the network service
    DisableNetwork,
    /// Remove the installed network unit
    RemoveNetworkUnit,
    /// Delete the network namespace
    DeleteNamespace,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleStep::EnsureDirectories => "ensure directories",
            LifecycleStep::EnsureAttachScript => "ensure attach script",
            LifecycleStep::EnsureUnitInstalled => "ensure unit installed",
            LifecycleStep::EnsureReloaded => "ensure reloaded",
            LifecycleStep::EnsureStarted => "ensure started",
            LifecycleStep::EnsurePeersScript => "ensure peers script",
            LifecycleStep::EnsureNetworkUnit => "ensure network unit",
            LifecycleStep::EnsureEnabled => "ensure enabled",
            LifecycleStep::EnsureNetworkStarted => "ensure network started",
            LifecycleStep::StopContainer => "stop container",
            LifecycleStep::RemoveContainerUnit => "remove container unit",
            LifecycleStep::StopNetwork => "stop network",
            LifecycleStep::DisableNetwork => "disable network",
            LifecycleStep::RemoveNetworkUnit => "remove network unit",
            LifecycleStep::DeleteNamespace => "delete namespace",
        };
        f.write_str(name)
    }
}

/// How a step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step changed something
    Done,
    /// Nothing to do; the reason is kept for diagnostics
    Skipped(String),
    /// The step failed and aborted the transition
    Failed(String),
}

/// One executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Which step
    pub step: LifecycleStep,
    /// How it ended
    pub outcome: StepOutcome,
    /// Wall clock start
    pub started_at: DateTime<Utc>,
    /// Elapsed milliseconds
    pub duration_ms: u64,
}

/// Timing handle for a step in progress
pub(crate) struct StepTimer {
    step: LifecycleStep,
    started_at: DateTime<Utc>,
    instant: Instant,
}

impl StepTimer {
    pub(crate) fn start(step: LifecycleStep) -> Self {
        Self {
            step,
            started_at: Utc::now(),
            instant: Instant::now(),
        }
    }
}

/// Everything a lifecycle operation did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleReport {
    /// Correlation id for logs
    pub run_id: Uuid,
    /// The operation
    pub operation: Operation,
    /// Container the operation was invoked for
    pub container: String,
    /// Steps in execution order
    pub steps: Vec<StepRecord>,
    /// Artifacts installed by this run
    pub artifacts: Vec<UnitArtifact>,
    /// Unit generator dry-run result, for `start`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ExecutionResult>,
    /// Raw command results, for `delete_overlay_network`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ExecutionResult>,
}

impl LifecycleReport {
    /// Empty report for an operation on `container`
    pub fn new(operation: Operation, container: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation,
            container: container.to_string(),
            steps: Vec::new(),
            artifacts: Vec::new(),
            validation: None,
            results: Vec::new(),
        }
    }

    /// Close a step: record its outcome and tag any error with the step
    pub(crate) fn complete(&mut self, timer: StepTimer, result: Result<StepOutcome>) -> Result<()> {
        let duration_ms = timer.instant.elapsed().as_millis() as u64;
        let (outcome, error) = match result {
            Ok(outcome) => (outcome, None),
            Err(error) => (StepOutcome::Failed(error.to_string()), Some(error)),
        };

        match &outcome {
            StepOutcome::Done => info!("[{}] {}: {} done", self.run_id, self.container, timer.step),
            StepOutcome::Skipped(reason) => {
                info!("[{}] {}: {} skipped ({})", self.run_id, self.container, timer.step, reason)
            }
            StepOutcome::Failed(reason) => {
                warn!("[{}] {}: {} failed: {}", self.run_id, self.container, timer.step, reason)
            }
        }

        self.steps.push(StepRecord {
            step: timer.step,
            outcome,
            started_at: timer.started_at,
            duration_ms,
        });

        match error {
            None => Ok(()),
            Some(source) => Err(ContainerError::Step {
                step: timer.step,
                source: Box::new(source),
            }),
        }
    }

    /// Record a step that was not attempted
    pub(crate) fn skip(&mut self, step: LifecycleStep, reason: impl Into<String>) {
        let timer = StepTimer::start(step);
        // Infallible: a skipped outcome never carries an error
        let _ = self.complete(timer, Ok(StepOutcome::Skipped(reason.into())));
    }

    /// Outcome of a step, if it ran
    pub fn outcome(&self, step: LifecycleStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|record| record.step == step)
            .map(|record| &record.outcome)
    }

    /// Steps in execution order
    pub fn step_names(&self) -> Vec<LifecycleStep> {
        self.steps.iter().map(|record| record.step).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_tags_errors_with_step() {
        let mut report = LifecycleReport::new(Operation::Start, "web1");

        report
            .complete(StepTimer::start(LifecycleStep::EnsureDirectories), Ok(StepOutcome::Done))
            .unwrap();
        let err = report
            .complete(
                StepTimer::start(LifecycleStep::EnsureAttachScript),
                Err(ContainerError::NotFound("x".into())),
            )
            .unwrap_err();

        assert_eq!(err.step(), Some(LifecycleStep::EnsureAttachScript));
        assert!(matches!(err.root(), ContainerError::NotFound(_)));
        assert_eq!(
            report.step_names(),
            vec![LifecycleStep::EnsureDirectories, LifecycleStep::EnsureAttachScript]
        );
        assert!(matches!(
            report.outcome(LifecycleStep::EnsureAttachScript),
            Some(StepOutcome::Failed(_))
        ));
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let mut report = LifecycleReport::new(Operation::Stop, "web1");
        report.skip(LifecycleStep::StopNetwork, "in use by web2");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation"], "stop");
        assert_eq!(json["steps"][0]["step"], "stop_network");
        assert_eq!(json["steps"][0]["outcome"]["status"], "skipped");
        assert_eq!(json["steps"][0]["outcome"]["detail"], "in use by web2");
    }

    #[test]
    fn test_step_display() {
        assert_eq!(LifecycleStep::EnsureUnitInstalled.to_string(), "ensure unit installed");
    }
}
