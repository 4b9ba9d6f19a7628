//! # Workflow Module
//!
//! A workflow is a DAG of steps built from a named template. The scheduler
//! runs ready steps concurrently, round by round, and the engine wraps a run
//! into a stream of chunks:
//!
//! ```text
//! start (text) -> per round: progress (text)... result... -> complete
//! ```
//!
//! A failed step does not stop the run; its dependents still execute and see
//! the failure in [`StepResults`]. Only a deadlock (pending steps, none ready)
//! aborts the workflow.

pub mod engine;
pub mod model;
pub mod operations;
pub mod scheduler;
pub mod step;
pub mod templates;

pub use engine::StreamingWorkflowEngine;
pub use model::{SharedWorkflow, StepSnapshot, Workflow, WorkflowSnapshot, WorkflowStatus};
pub use scheduler::WorkflowScheduler;
pub use step::{
    BoxedStepFuture, FnOperation, StepContext, StepOperation, StepOutcome, StepParams,
    StepResults, StepStatus, WorkflowStep,
};
pub use templates::{TemplateFactory, TemplateRegistry};
