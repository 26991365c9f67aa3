//! Multi-step workflow runner.
//!
//! Promotion, kick, private-call and screen-share sequences are a fixed list
//! of store writes, signals and subscription changes. A failed step is logged
//! and counted, and the remaining steps still run; the caller gets a
//! [`WorkflowReport`] listing what failed.

use crate::errors::ScError;
use crate::observability::metrics;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

/// One failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step: &'static str,
    pub error: String,
}

/// Outcome of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub workflow: &'static str,
    /// The workflow decided there was nothing to do.
    pub skipped: bool,
    pub failed_steps: Vec<StepFailure>,
}

impl WorkflowReport {
    /// Report for a workflow that returned before running any step.
    #[must_use]
    pub fn skipped(workflow: &'static str) -> Self {
        Self {
            workflow,
            skipped: true,
            failed_steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_steps.is_empty()
    }

    #[must_use]
    pub fn failed(&self, step: &str) -> bool {
        self.failed_steps.iter().any(|f| f.step == step)
    }

    /// Fold a nested workflow's failures into this one.
    pub fn absorb(&mut self, other: WorkflowReport) {
        self.failed_steps.extend(other.failed_steps);
    }
}

/// Step recorder for one workflow run.
#[derive(Debug)]
pub struct Workflow {
    name: &'static str,
    started: Instant,
    failures: Vec<StepFailure>,
}

impl Workflow {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        debug!(target: "sc.workflow", workflow = name, "Workflow started");
        Self {
            name,
            started: Instant::now(),
            failures: Vec::new(),
        }
    }

    /// Record a step result. Failures are logged and swallowed.
    pub fn step<T>(&mut self, step: &'static str, result: Result<T, ScError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    target: "sc.workflow",
                    workflow = self.name,
                    step,
                    error = %e,
                    "Workflow step failed, continuing"
                );
                metrics::record_workflow_step_failure(self.name, step);
                self.failures.push(StepFailure {
                    step,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Fold a nested workflow's failures into this run.
    pub fn absorb(&mut self, report: WorkflowReport) {
        self.failures.extend(report.failed_steps);
    }

    #[must_use]
    pub fn finish(self) -> WorkflowReport {
        metrics::record_workflow_duration(self.name, self.started.elapsed());
        debug!(
            target: "sc.workflow",
            workflow = self.name,
            failed = self.failures.len(),
            "Workflow finished"
        );
        WorkflowReport {
            workflow: self.name,
            skipped: false,
            failed_steps: self.failures,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_step_does_not_stop_workflow() {
        let mut workflow = Workflow::new("send_to_backstage");
        let first: Option<u8> = workflow.step("signal_join", Err(ScError::Signal("closed".into())));
        let second = workflow.step("persist_flag", Ok(7));
        assert_eq!(first, None);
        assert_eq!(second, Some(7));

        let report = workflow.finish();
        assert!(!report.skipped);
        assert!(report.failed("signal_join"));
        assert!(!report.failed("persist_flag"));
        assert_eq!(report.failed_steps.len(), 1);
    }

    #[test]
    fn test_absorb_nested_report() {
        let mut inner = Workflow::new("end_private_call");
        inner.step::<()>("unsubscribe", Err(ScError::StreamNotFound("s".into())));

        let mut outer = Workflow::new("send_to_stage");
        outer.absorb(inner.finish());
        let report = outer.finish();
        assert!(report.failed("unsubscribe"));
        assert_eq!(report.workflow, "send_to_stage");
    }

    #[test]
    fn test_skipped_report_is_clean() {
        let report = WorkflowReport::skipped("send_to_stage");
        assert!(report.skipped);
        assert!(report.is_clean());
    }
}
