//! Steps: the unit of work inside a workflow.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::ResearchExecutor;
use crate::error::StepError;

/// Template-bound keyword arguments of a step. Never mutated after construction.
pub type StepParams = BTreeMap<String, String>;

/// Lifecycle of a step: `Pending -> Running -> {Completed, Failed}`, once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// Reserved; the scheduler never produces it today.
    Cancelled,
}

/// Terminal outcome of an upstream step, as seen by its dependents.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(Value),
    Failed(String),
}

/// Outcomes of the steps that finished so far, keyed by step id.
#[derive(Debug, Clone, Default)]
pub struct StepResults {
    outcomes: HashMap<String, StepOutcome>,
}

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step_id: impl Into<String>, outcome: StepOutcome) {
        self.outcomes.insert(step_id.into(), outcome);
    }

    pub fn get(&self, step_id: &str) -> Option<&StepOutcome> {
        self.outcomes.get(step_id)
    }

    /// The value of a completed step; `None` if it failed or has not run.
    pub fn value(&self, step_id: &str) -> Option<&Value> {
        match self.outcomes.get(step_id) {
            Some(StepOutcome::Completed(value)) => Some(value),
            _ => None,
        }
    }

    /// Like [`StepResults::value`], but a missing value is an error.
    pub fn require(&self, step_id: &str) -> Result<&Value, StepError> {
        self.value(step_id)
            .ok_or_else(|| StepError::MissingInput(step_id.to_string()))
    }

    /// Which of `step_ids` produced no value.
    pub fn missing<'a>(&self, step_ids: &[&'a str]) -> Vec<&'a str> {
        step_ids
            .iter()
            .copied()
            .filter(|id| self.value(id).is_none())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// What a step operation can reach while it runs.
#[derive(Clone)]
pub struct StepContext {
    pub executor: Arc<dyn ResearchExecutor>,
    pub conversation_id: Option<String>,
}

impl StepContext {
    pub fn new(executor: Arc<dyn ResearchExecutor>, conversation_id: Option<String>) -> Self {
        Self {
            executor,
            conversation_id,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }
}

/// The body of a step.
#[async_trait]
pub trait StepOperation: Send + Sync {
    async fn execute(
        &self,
        params: &StepParams,
        previous: &StepResults,
        ctx: &StepContext,
    ) -> Result<Value, StepError>;
}

pub type BoxedStepFuture = Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send>>;

/// Adapts a closure into a [`StepOperation`].
///
/// The closure receives owned copies of its inputs so the returned future can be `'static`.
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F>
where
    F: Fn(StepParams, StepResults, StepContext) -> BoxedStepFuture + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> StepOperation for FnOperation<F>
where
    F: Fn(StepParams, StepResults, StepContext) -> BoxedStepFuture + Send + Sync,
{
    async fn execute(
        &self,
        params: &StepParams,
        previous: &StepResults,
        ctx: &StepContext,
    ) -> Result<Value, StepError> {
        (self.f)(params.clone(), previous.clone(), ctx.clone()).await
    }
}

/// A step of a workflow: identity, operation, bound params, dependencies and lifecycle.
#[derive(Clone)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub operation: Arc<dyn StepOperation>,
    pub params: StepParams,
    pub dependencies: Vec<String>,
    pub status: StepStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        operation: Arc<dyn StepOperation>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            operation,
            params: StepParams::new(),
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            result: None,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        elapsed(self.start_time, self.end_time)
    }

    /// Pending -> Running. Ignored in any other state.
    pub(crate) fn mark_running(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != StepStatus::Pending {
            return false;
        }
        self.status = StepStatus::Running;
        self.start_time = Some(now);
        true
    }

    /// Running -> Completed/Failed. Ignored unless running.
    pub(crate) fn finish(&mut self, outcome: &StepOutcome, now: DateTime<Utc>) -> bool {
        if self.status != StepStatus::Running {
            return false;
        }
        match outcome {
            StepOutcome::Completed(value) => {
                self.status = StepStatus::Completed;
                self.result = Some(value.clone());
            }
            StepOutcome::Failed(message) => {
                self.status = StepStatus::Failed;
                self.error = Some(message.clone());
            }
        }
        self.end_time = Some(now);
        true
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("dependencies", &self.dependencies)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

pub(crate) fn elapsed(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<Duration> {
    let (start, end) = (start?, end?);
    (end - start).to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    #[test]
    fn test_step_lifecycle_runs_once() {
        let mut step = WorkflowStep::new("a", "Step A", Arc::new(Noop)).with_param("query", "x");
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.duration().is_none());

        let t0 = Utc::now();
        assert!(step.mark_running(t0));
        assert!(!step.mark_running(t0));

        let t1 = t0 + chrono::Duration::milliseconds(250);
        assert!(step.finish(&StepOutcome::Completed(json!(1)), t1));
        assert!(!step.finish(&StepOutcome::Failed("again".into()), t1));

        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.result, Some(json!(1)));
        assert!(step.error.is_none());
        assert_eq!(step.duration(), Some(Duration::from_millis(250)));
        assert_eq!(step.params["query"], "x");
    }

    #[test]
    fn test_failed_step_records_error_only() {
        let mut step = WorkflowStep::new("a", "Step A", Arc::new(Noop));
        step.mark_running(Utc::now());
        step.finish(&StepOutcome::Failed("boom".into()), Utc::now());
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("boom"));
        assert!(step.result.is_none());
    }

    #[test]
    fn test_step_results_lookup() {
        let mut results = StepResults::new();
        results.insert("ok", StepOutcome::Completed(json!({"n": 1})));
        results.insert("bad", StepOutcome::Failed("down".into()));

        assert_eq!(results.value("ok"), Some(&json!({"n": 1})));
        assert!(results.value("bad").is_none());
        assert!(matches!(results.get("bad"), Some(StepOutcome::Failed(_))));
        assert!(matches!(
            results.require("absent"),
            Err(StepError::MissingInput(id)) if id == "absent"
        ));
        assert_eq!(results.missing(&["ok", "bad", "absent"]), vec!["bad", "absent"]);
    }
}
