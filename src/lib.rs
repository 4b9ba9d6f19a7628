//! # AI Research Workflow
//!
//! Multi-step research workflows over web search and a local LLM.
//!
//! A research task is a DAG of steps (searches, lookups, summaries,
//! analyses). The [`workflow::StreamingWorkflowEngine`] builds one from a
//! named template, runs ready steps concurrently and streams progress back
//! as [`stream::StreamChunk`]s.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use ai_research_workflow::agent::{AgentManager, ResearchAgent};
//! use ai_research_workflow::config::Config;
//! use ai_research_workflow::workflow::StreamingWorkflowEngine;
//! use futures::StreamExt;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let agents = Arc::new(AgentManager::new());
//! agents.register("default", Arc::new(ResearchAgent::from_config(&config)));
//!
//! let engine = StreamingWorkflowEngine::new(agents);
//! let params = HashMap::from([("query".to_string(), "rust async runtimes".to_string())]);
//! let mut chunks = engine.execute_workflow_stream("comprehensive_search", params, "default", None);
//! while let Some(chunk) = chunks.next().await {
//!     println!("{:?}", chunk.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod queue;
pub mod stream;
pub mod tools;
pub mod workflow;

pub use error::{StepError, ToolError, WorkflowError};
pub use stream::{ChunkContent, ChunkStream, ChunkType, StreamChunk};
