//! Level-synchronous DAG execution.
//!
//! Each round collects every pending step whose dependencies have all
//! finished (completed *or* failed), runs that batch concurrently and folds
//! the outcomes back in before computing the next round. Ready sets are
//! recomputed on every round instead of precomputing topological levels.
//!
//! Chunk order per round: one progress chunk per launched step, in
//! declaration order, then one result chunk per step in the order the steps
//! settle.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use serde_json::json;
use tracing::{debug, error, warn};

use super::model::{SharedWorkflow, WorkflowStatus};
use super::step::{StepContext, StepOperation, StepOutcome, StepParams, StepResults, StepStatus};
use crate::error::{StepError, WorkflowError};
use crate::stream::StreamChunk;

/// A step picked for the current round, detached from the workflow lock.
struct ReadyStep {
    id: String,
    name: String,
    operation: Arc<dyn StepOperation>,
    params: StepParams,
}

pub struct WorkflowScheduler;

impl WorkflowScheduler {
    /// Drive `workflow` to completion, yielding progress and result chunks.
    ///
    /// The stream ends after the last step settles, or right after yielding a
    /// [`WorkflowError::Deadlock`]. The workflow is left `Completed` (even if
    /// steps failed) or `Failed` on a scheduler error. Dropping the stream
    /// drops any step futures still in flight.
    pub fn run(
        workflow: SharedWorkflow,
        ctx: StepContext,
    ) -> impl Stream<Item = Result<StreamChunk, WorkflowError>> + Send + 'static {
        async_stream::stream! {
            let workflow_id = workflow.read().id.clone();

            // Steps are tracked by id; a repeated id could never settle.
            let duplicate = workflow
                .read()
                .duplicate_step_ids()
                .first()
                .map(|id| id.to_string());
            if let Some(step_id) = duplicate {
                error!(workflow_id = %workflow_id, step_id = %step_id, "Duplicate step id");
                workflow.write().finish(WorkflowStatus::Failed, Utc::now());
                yield Err(WorkflowError::DuplicateStep(step_id));
                return;
            }

            workflow.write().mark_running(Utc::now());

            let mut results = StepResults::new();
            let mut round = 0usize;

            loop {
                let batch = match next_batch(&workflow, &results) {
                    Ok(Some(batch)) => batch,
                    Ok(None) => break,
                    Err(e) => {
                        error!(workflow_id = %workflow_id, error = %e, "Workflow deadlocked");
                        workflow.write().finish(WorkflowStatus::Failed, Utc::now());
                        yield Err(e);
                        return;
                    }
                };
                round += 1;
                debug!(workflow_id = %workflow_id, round, steps = batch.len(), "Launching ready steps");

                // Every step in the round sees the same upstream results.
                let previous = Arc::new(results.clone());
                let mut running = FuturesUnordered::new();

                for ready in batch {
                    {
                        let mut wf = workflow.write();
                        if let Some(step) = wf.step_mut(&ready.id) {
                            step.mark_running(Utc::now());
                        }
                    }
                    debug!(workflow_id = %workflow_id, step_id = %ready.id, "Step started");
                    yield Ok(StreamChunk::text(format!("Executing step: {}", ready.name))
                        .with_id(format!("step_{}", ready.id)));

                    let previous = Arc::clone(&previous);
                    let ctx = ctx.clone();
                    running.push(async move {
                        let settled = AssertUnwindSafe(
                            ready.operation.execute(&ready.params, &previous, &ctx),
                        )
                        .catch_unwind()
                        .await;
                        (ready, settled)
                    });
                }

                while let Some((ready, settled)) = running.next().await {
                    let outcome = match settled {
                        Ok(Ok(value)) => StepOutcome::Completed(value),
                        Ok(Err(e)) => StepOutcome::Failed(e.to_string()),
                        Err(payload) => {
                            StepOutcome::Failed(StepError::Panicked(panic_message(payload)).to_string())
                        }
                    };

                    let duration = {
                        let mut wf = workflow.write();
                        wf.step_mut(&ready.id).and_then(|step| {
                            step.finish(&outcome, Utc::now());
                            step.duration()
                        })
                    };
                    let duration = duration.map(|d| d.as_secs_f64());

                    let chunk = match &outcome {
                        StepOutcome::Completed(value) => {
                            debug!(workflow_id = %workflow_id, step_id = %ready.id, ?duration, "Step completed");
                            StreamChunk::result(json!({
                                "step_id": ready.id,
                                "step_name": ready.name,
                                "result": value,
                                "duration": duration,
                            }))
                            .with_id(format!("result_{}", ready.id))
                        }
                        StepOutcome::Failed(message) => {
                            warn!(workflow_id = %workflow_id, step_id = %ready.id, error = %message, "Step failed");
                            StreamChunk::result(json!({
                                "step_id": ready.id,
                                "step_name": ready.name,
                                "error": message,
                            }))
                            .with_id(format!("error_{}", ready.id))
                        }
                    };

                    results.insert(ready.id, outcome);
                    yield Ok(chunk);
                }
            }

            workflow.write().finish(WorkflowStatus::Completed, Utc::now());
        }
    }
}

/// Pick the next round of ready steps.
///
/// `Ok(None)` once nothing is pending. A dependency counts as satisfied once
/// the step it names has finished, successfully or not; an id that names no
/// step is never satisfied and ends in a deadlock.
fn next_batch(
    workflow: &SharedWorkflow,
    results: &StepResults,
) -> Result<Option<Vec<ReadyStep>>, WorkflowError> {
    let wf = workflow.read();
    let pending: Vec<_> = wf
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::Pending)
        .collect();

    if pending.is_empty() {
        return Ok(None);
    }

    let ready: Vec<ReadyStep> = pending
        .iter()
        .filter(|step| step.dependencies.iter().all(|dep| results.get(dep).is_some()))
        .map(|step| ReadyStep {
            id: step.id.clone(),
            name: step.name.clone(),
            operation: Arc::clone(&step.operation),
            params: step.params.clone(),
        })
        .collect();

    if ready.is_empty() {
        return Err(WorkflowError::Deadlock {
            pending: pending.iter().map(|step| step.id.clone()).collect(),
        });
    }

    Ok(Some(ready))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
