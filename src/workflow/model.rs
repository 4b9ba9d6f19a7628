//! Workflows: an ordered set of steps forming one DAG execution.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::{elapsed, StepStatus, WorkflowStep};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    /// Set when the scheduler finishes, even if some steps failed.
    Completed,
    /// Set only when the scheduler itself aborts.
    Failed,
    Cancelled,
}

/// One execution of a template. Steps keep declaration order.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps: Vec::new(),
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub(crate) fn step_mut(&mut self, step_id: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    pub fn total_duration(&self) -> Option<Duration> {
        elapsed(self.started_at, self.completed_at)
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// `(step, dependency)` pairs whose dependency id is not a step of this workflow.
    pub fn dangling_dependencies(&self) -> Vec<(&str, &str)> {
        let mut dangling = Vec::new();
        for step in &self.steps {
            for dep in &step.dependencies {
                if self.step(dep).is_none() {
                    dangling.push((step.id.as_str(), dep.as_str()));
                }
            }
        }
        dangling
    }

    /// Step ids declared more than once, each listed once.
    pub fn duplicate_step_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for step in &self.steps {
            let id = step.id.as_str();
            if !seen.insert(id) && !duplicates.contains(&id) {
                duplicates.push(id);
            }
        }
        duplicates
    }

    pub(crate) fn mark_running(&mut self, now: DateTime<Utc>) {
        if self.status == WorkflowStatus::Pending {
            self.status = WorkflowStatus::Running;
            self.started_at = Some(now);
        }
    }

    pub(crate) fn finish(&mut self, status: WorkflowStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(now);
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            steps: self
                .steps
                .iter()
                .map(|step| StepSnapshot {
                    id: step.id.clone(),
                    name: step.name.clone(),
                    status: step.status,
                    duration: step.duration().map(|d| d.as_secs_f64()),
                    error: step.error.clone(),
                })
                .collect(),
        }
    }
}

/// Serializable view of a running workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub id: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    /// Seconds.
    pub duration: Option<f64>,
    pub error: Option<String>,
}

/// A workflow shared between the scheduler and status queries.
///
/// Guards are never held across an `.await`.
#[derive(Debug, Clone)]
pub struct SharedWorkflow(Arc<RwLock<Workflow>>);

impl SharedWorkflow {
    pub fn new(workflow: Workflow) -> Self {
        Self(Arc::new(RwLock::new(workflow)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Workflow> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Workflow> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.read().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::{StepContext, StepOperation, StepOutcome, StepParams, StepResults};
    use crate::error::StepError;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Noop;

    #[async_trait]
    impl StepOperation for Noop {
        async fn execute(
            &self,
            _params: &StepParams,
            _previous: &StepResults,
            _ctx: &StepContext,
        ) -> Result<Value, StepError> {
            Ok(Value::Null)
        }
    }

    fn two_steps() -> Workflow {
        Workflow::new("wf-1", "Demo")
            .with_step(WorkflowStep::new("a", "A", Arc::new(Noop)))
            .with_step(WorkflowStep::new("b", "B", Arc::new(Noop)).depends_on(["a", "ghost"]))
    }

    #[test]
    fn test_dangling_dependencies() {
        assert_eq!(two_steps().dangling_dependencies(), vec![("b", "ghost")]);
    }

    #[test]
    fn test_duplicate_step_ids() {
        assert!(two_steps().duplicate_step_ids().is_empty());

        let workflow = two_steps()
            .with_step(WorkflowStep::new("a", "A again", Arc::new(Noop)))
            .with_step(WorkflowStep::new("a", "A thrice", Arc::new(Noop)));
        assert_eq!(workflow.duplicate_step_ids(), vec!["a"]);
    }

    #[test]
    fn test_snapshot_reports_step_state() {
        let mut workflow = two_steps();
        let now = Utc::now();
        workflow.mark_running(now);
        let step = workflow.step_mut("a").unwrap();
        step.mark_running(now);
        step.finish(&StepOutcome::Failed("offline".into()), now);

        let snapshot = SharedWorkflow::new(workflow).snapshot();
        assert_eq!(snapshot.status, WorkflowStatus::Running);
        assert_eq!(snapshot.steps[0].status, StepStatus::Failed);
        assert_eq!(snapshot.steps[0].error.as_deref(), Some("offline"));
        assert_eq!(snapshot.steps[0].duration, Some(0.0));
        assert_eq!(snapshot.steps[1].status, StepStatus::Pending);
        assert!(snapshot.steps[1].duration.is_none());
    }

    #[test]
    fn test_total_duration() {
        let mut workflow = two_steps();
        let start = Utc::now();
        workflow.mark_running(start);
        assert!(workflow.total_duration().is_none());
        workflow.finish(WorkflowStatus::Completed, start + chrono::Duration::seconds(2));
        assert_eq!(workflow.total_duration(), Some(Duration::from_secs(2)));
    }
}
