//! Streaming workflow engine: the entry point for running templates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use tracing::{info, warn};

use super::model::{SharedWorkflow, WorkflowSnapshot};
use super::scheduler::WorkflowScheduler;
use super::step::{StepContext, StepStatus};
use super::templates::{TemplateFactory, TemplateRegistry};
use crate::agent::AgentManager;
use crate::error::WorkflowError;
use crate::stream::{ChunkStream, StreamChunk};

type ActiveWorkflows = Arc<Mutex<HashMap<String, SharedWorkflow>>>;

fn lock(active: &ActiveWorkflows) -> MutexGuard<'_, HashMap<String, SharedWorkflow>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a workflow from the active set when dropped.
///
/// Moved into the chunk stream, so it fires when the run finishes and also
/// when the caller drops the stream early.
struct ActiveGuard {
    active: ActiveWorkflows,
    workflow_id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.workflow_id);
    }
}

/// Runs workflow templates and streams their progress.
pub struct StreamingWorkflowEngine {
    agents: Arc<AgentManager>,
    templates: TemplateRegistry,
    active: ActiveWorkflows,
}

impl StreamingWorkflowEngine {
    /// Engine with the built-in templates.
    pub fn new(agents: Arc<AgentManager>) -> Self {
        Self::with_templates(agents, TemplateRegistry::with_defaults())
    }

    pub fn with_templates(agents: Arc<AgentManager>, templates: TemplateRegistry) -> Self {
        Self {
            agents,
            templates,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register_template(&mut self, name: impl Into<String>, factory: TemplateFactory) {
        self.templates.register(name, factory);
    }

    pub fn list_workflow_templates(&self) -> Vec<String> {
        self.templates.names()
    }

    /// Snapshot of a workflow that is still running; `None` once its stream ended.
    pub fn get_workflow_status(&self, workflow_id: &str) -> Option<WorkflowSnapshot> {
        let workflow = lock(&self.active).get(workflow_id).cloned()?;
        Some(workflow.snapshot())
    }

    pub fn active_workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.active).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Build `template_name` from `params` and run it with agent `agent_id`.
    ///
    /// The stream always ends with exactly one `complete` chunk. An unknown
    /// template or agent yields only that chunk, carrying an `error` field,
    /// and no workflow is created. Otherwise the workflow is discoverable
    /// through [`Self::get_workflow_status`] until the stream finishes or is
    /// dropped.
    pub fn execute_workflow_stream(
        &self,
        template_name: &str,
        params: HashMap<String, String>,
        agent_id: &str,
        conversation_id: Option<String>,
    ) -> ChunkStream {
        if !self.templates.contains(template_name) {
            return rejected(WorkflowError::UnknownTemplate(template_name.to_string()));
        }
        let Some(executor) = self.agents.get(agent_id) else {
            return rejected(WorkflowError::UnknownAgent(agent_id.to_string()));
        };

        let workflow_id = uuid::Uuid::new_v4().to_string();
        let workflow = match self.templates.build(template_name, &workflow_id, &params) {
            Ok(workflow) => workflow,
            Err(e) => return rejected(e),
        };
        let workflow_name = workflow.name.clone();
        let shared = SharedWorkflow::new(workflow);

        lock(&self.active).insert(workflow_id.clone(), shared.clone());
        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
            workflow_id: workflow_id.clone(),
        };

        let ctx = StepContext::new(executor, conversation_id);
        let template = template_name.to_string();

        Box::pin(async_stream::stream! {
            let guard = guard;
            info!(workflow_id = %workflow_id, template = %template, "Workflow started");

            yield StreamChunk::text(format!("Starting workflow: {workflow_name}"))
                .with_id(format!("start_{workflow_id}"));

            let mut steps = Box::pin(WorkflowScheduler::run(shared.clone(), ctx));
            let mut failure = None;
            while let Some(item) = steps.next().await {
                match item {
                    Ok(chunk) => yield chunk,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            let terminal = match failure {
                None => {
                    let wf = shared.read();
                    let completed = wf.count_with_status(StepStatus::Completed);
                    let failed = wf.count_with_status(StepStatus::Failed);
                    info!(
                        workflow_id = %workflow_id,
                        steps_completed = completed,
                        steps_failed = failed,
                        "Workflow finished"
                    );
                    StreamChunk::complete(json!({
                        "workflow_id": workflow_id,
                        "status": wf.status,
                        "duration": wf.total_duration().map(|d| d.as_secs_f64()),
                        "steps_completed": completed,
                        "steps_failed": failed,
                    }))
                    .with_id(format!("complete_{workflow_id}"))
                }
                Some(e) => {
                    warn!(workflow_id = %workflow_id, error = %e, "Workflow failed");
                    StreamChunk::complete(json!({
                        "error": format!("Workflow execution failed: {e}"),
                        "workflow_id": workflow_id,
                    }))
                    .with_id(format!("error_{workflow_id}"))
                }
            };

            // Unregister before the terminal chunk reaches the caller.
            drop(guard);
            yield terminal;
        })
    }
}

fn rejected(error: WorkflowError) -> ChunkStream {
    warn!(error = %error, "Workflow rejected");
    let chunk = StreamChunk::complete(json!({ "error": error.to_string() }))
        .with_id(format!("error_{}", Utc::now().timestamp()));
    Box::pin(futures::stream::once(async move { chunk }))
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(StreamingWorkflowEngine: Send, Sync);

    #[tokio::test]
    async fn test_unknown_agent_is_rejected_without_workflow() {
        let engine = StreamingWorkflowEngine::new(Arc::new(AgentManager::new()));
        let chunks: Vec<StreamChunk> = engine
            .execute_workflow_stream("comprehensive_search", HashMap::new(), "ghost", None)
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_error());
        assert_eq!(
            chunks[0].content.field("error").and_then(|v| v.as_str()),
            Some("Agent ghost not found")
        );
        assert!(engine.active_workflow_ids().is_empty());
    }

    #[test]
    fn test_lists_default_templates() {
        let engine = StreamingWorkflowEngine::new(Arc::new(AgentManager::new()));
        assert_eq!(engine.list_workflow_templates().len(), 5);
        assert!(engine.get_workflow_status("missing").is_none());
    }
}
