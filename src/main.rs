//! # AI Research Workflow
//!
//! Command-line front end for the streaming workflow engine.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- templates
//! cargo run -- run comprehensive_search -p query="Rust async runtimes"
//! cargo run -- search "tokio tutorial" --type tech_doc
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ai_research_workflow::agent::{AgentManager, ResearchAgent, ResearchExecutor};
use ai_research_workflow::config::Config;
use ai_research_workflow::queue::{AsyncTaskQueue, TaskStatus};
use ai_research_workflow::stream::{ChunkContent, ChunkType};
use ai_research_workflow::tools::SearchType;
use ai_research_workflow::workflow::StreamingWorkflowEngine;

/// Agent id the CLI registers its research agent under.
const DEFAULT_AGENT: &str = "default";

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "ai-research-workflow",
    version,
    about = "Run multi-step research workflows over web search and a local LLM",
    long_about = r#"
AI Research Workflow - multi-step research with streamed progress.

Workflows are DAGs of search, lookup and analysis steps. Independent steps
run concurrently; progress is printed as each step starts and finishes.

SEARCH PROVIDERS:
  Set TAVILY_API_KEY to search through Tavily; otherwise DuckDuckGo is used.

LANGUAGE MODEL (optional):
  Set USE_LLM=true to summarize through Ollama (ollama serve; ollama pull llama3.2).

EXAMPLES:
  ai-research-workflow templates
  ai-research-workflow run competitive_analysis -p company=Tesla -p industry=automotive
  ai-research-workflow run trend_analysis -p domain="edge computing" -p timeframe=5years
  ai-research-workflow search "latest AI news" --max-results 5 --summarize
  ai-research-workflow batch comprehensive_search --vary query tokio async-std smol
"#
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// The Ollama model to use (overrides OLLAMA_MODEL env var)
    #[arg(short = 'm', long = "model", global = true)]
    model: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a workflow template and stream its progress
    Run {
        /// Template name (see `templates`)
        template: String,

        /// Template parameter, repeatable: -p key=value
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Attribute tool calls to this conversation
        #[arg(long = "conversation")]
        conversation: Option<String>,
    },

    /// Run one template for several values of a parameter on the background task queue
    Batch {
        template: String,

        /// Parameter that takes a different value per run
        #[arg(long = "vary")]
        vary: String,

        /// Values for the varying parameter
        #[arg(required = true, num_args = 1..)]
        values: Vec<String>,

        /// Parameter shared by every run, repeatable: -p key=value
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// List available workflow templates
    Templates,

    /// Run a single smart search
    Search {
        query: String,

        /// general, news, academic, product, tech_doc or qa
        #[arg(short = 't', long = "type", default_value = "general")]
        search_type: SearchType,

        #[arg(short = 'n', long = "max-results")]
        max_results: Option<usize>,

        /// Also summarize the result snippets
        #[arg(short = 's', long = "summarize", default_value = "false")]
        summarize: bool,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(model) = args.model {
        config.model = model;
    }
    config.validate()?;

    init_logging(args.verbose, &config.log_level)?;
    info!(
        model = %config.model,
        llm = config.use_llm,
        tavily = config.tavily_api_key.is_some(),
        "Configuration loaded"
    );

    let agent = Arc::new(ResearchAgent::from_config(&config));

    match args.command {
        Command::Templates => {
            let engine = StreamingWorkflowEngine::new(Arc::new(AgentManager::new()));
            for name in engine.list_workflow_templates() {
                println!("{name}");
            }
        }
        Command::Search {
            query,
            search_type,
            max_results,
            summarize,
        } => {
            let max_results = max_results.unwrap_or(config.max_search_results);
            let response = agent
                .search(&query, search_type, max_results, None)
                .await
                .into_output()
                .context("Search failed")?;

            println!("[{}] {}\n", response.search_type, response.summary);
            for (rank, result) in response.results.iter().enumerate() {
                println!("{}. {}\n   {}\n   {}\n", rank + 1, result.title, result.url, result.snippet);
            }
            if !response.suggestions.is_empty() {
                println!("Related: {}", response.suggestions.join(" | "));
            }

            if summarize {
                let text: Vec<&str> = response.results.iter().map(|r| r.snippet.as_str()).collect();
                let output = agent
                    .summarize(&text.join(" "), config.summary_max_length, None)
                    .await
                    .into_output()
                    .context("Summary failed")?;
                println!("\nSummary: {}", output.summary);
            }
        }
        Command::Run {
            template,
            params,
            conversation,
        } => {
            let agents = Arc::new(AgentManager::new());
            agents.register(DEFAULT_AGENT, agent);
            let engine = StreamingWorkflowEngine::new(agents);

            let params: HashMap<String, String> = params.into_iter().collect();
            let mut chunks =
                engine.execute_workflow_stream(&template, params, DEFAULT_AGENT, conversation);

            let mut failed = false;
            while let Some(chunk) = chunks.next().await {
                failed |= chunk.is_error();
                print_chunk(chunk.chunk_type, &chunk.content)?;
            }

            if failed {
                error!(template = %template, "Workflow did not complete");
                anyhow::bail!("workflow '{template}' failed");
            }
        }
        Command::Batch {
            template,
            vary,
            values,
            params,
        } => {
            let agents = Arc::new(AgentManager::new());
            agents.register(DEFAULT_AGENT, agent);
            let engine = Arc::new(StreamingWorkflowEngine::new(agents));

            let queue: AsyncTaskQueue<Value> = AsyncTaskQueue::new(config.max_concurrent_tasks);
            queue.start_workers();

            let shared: HashMap<String, String> = params.into_iter().collect();
            let mut task_ids = Vec::with_capacity(values.len());
            for (index, value) in values.iter().enumerate() {
                let mut run_params = shared.clone();
                run_params.insert(vary.clone(), value.clone());
                let engine = Arc::clone(&engine);
                let template = template.clone();
                let task_id = batch_task_id(&template, index, value);
                task_ids.push(queue.submit_task(task_id, async move {
                    run_to_completion(&engine, &template, run_params).await
                })?);
            }

            while task_ids.iter().any(|id| {
                !matches!(
                    queue.get_task_status(id),
                    TaskStatus::Completed | TaskStatus::Failed
                )
            }) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            queue.stop_workers().await;

            let mut failures = 0;
            for id in &task_ids {
                match queue.get_task_result(id) {
                    Some(summary) => println!("✓ {id}: {summary}"),
                    None => {
                        failures += 1;
                        println!("✗ {id}: {}", queue.get_task_error(id).unwrap_or_default());
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{failures} of {} runs failed", task_ids.len());
            }
        }
    }

    Ok(())
}

/// Queue id of one batch run. The index keeps repeated values apart.
fn batch_task_id(template: &str, index: usize, value: &str) -> String {
    format!("{template}#{index}[{value}]")
}

/// Drain a workflow stream and return its terminal summary.
async fn run_to_completion(
    engine: &StreamingWorkflowEngine,
    template: &str,
    params: HashMap<String, String>,
) -> Result<Value> {
    let mut chunks = engine.execute_workflow_stream(template, params, DEFAULT_AGENT, None);
    let mut last = None;
    while let Some(chunk) = chunks.next().await {
        last = Some(chunk);
    }

    let terminal = last.context("workflow produced no output")?;
    if let Some(err) = terminal.content.field("error") {
        anyhow::bail!("{err}");
    }
    terminal
        .content
        .as_structured()
        .cloned()
        .context("terminal chunk carried no summary")
}

fn print_chunk(chunk_type: ChunkType, content: &ChunkContent) -> Result<()> {
    match (chunk_type, content) {
        (_, ChunkContent::Text(text)) => println!("{text}"),
        (ChunkType::Result, ChunkContent::Structured(value)) => {
            let step = value["step_name"].as_str().unwrap_or("step");
            match value.get("error") {
                Some(err) => println!("  ✗ {step}: {err}"),
                None => println!("  ✓ {step}\n{}", serde_json::to_string_pretty(&value["result"])?),
            }
        }
        (ChunkType::Complete, ChunkContent::Structured(value)) => {
            println!("\n{}", "=".repeat(60));
            println!("{}", serde_json::to_string_pretty(value)?);
            println!("{}", "=".repeat(60));
        }
        // Unknown or informational kinds are skipped.
        _ => {}
    }
    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// `--verbose` forces DEBUG; otherwise `RUST_LOG` (or INFO) applies.
fn init_logging(verbose: bool, log_level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parsing() {
        let args = Args::parse_from([
            "test",
            "run",
            "competitive_analysis",
            "-p",
            "company=Acme",
            "--param",
            "industry=rockets",
        ]);
        assert!(!args.verbose);
        match args.command {
            Command::Run {
                template, params, ..
            } => {
                assert_eq!(template, "competitive_analysis");
                assert_eq!(
                    params,
                    vec![
                        ("company".to_string(), "Acme".to_string()),
                        ("industry".to_string(), "rockets".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_search_args_with_flags() {
        let args = Args::parse_from([
            "test",
            "search",
            "Test query",
            "--type",
            "news",
            "--verbose",
            "--model",
            "llama3.2",
        ]);

        assert!(args.verbose);
        assert_eq!(args.model, Some("llama3.2".to_string()));
        match args.command {
            Command::Search {
                query,
                search_type,
                max_results,
                summarize,
            } => {
                assert_eq!(query, "Test query");
                assert_eq!(search_type, SearchType::News);
                assert!(max_results.is_none());
                assert!(!summarize);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_batch_args_parsing() {
        let args = Args::parse_from([
            "test",
            "batch",
            "trend_analysis",
            "--vary",
            "domain",
            "robotics",
            "biotech",
            "-p",
            "timeframe=5years",
        ]);
        match args.command {
            Command::Batch {
                template,
                vary,
                values,
                params,
            } => {
                assert_eq!(template, "trend_analysis");
                assert_eq!(vary, "domain");
                assert_eq!(values, vec!["robotics", "biotech"]);
                assert_eq!(params, vec![("timeframe".to_string(), "5years".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_batch_task_ids_are_unique_per_run() {
        let first = batch_task_id("trend_analysis", 0, "robotics");
        let second = batch_task_id("trend_analysis", 1, "robotics");
        assert_ne!(first, second);
        assert_eq!(first, "trend_analysis#0[robotics]");
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("query=rust async"),
            Ok(("query".to_string(), "rust async".to_string()))
        );
        assert_eq!(parse_param("a=b=c"), Ok(("a".to_string(), "b=c".to_string())));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }
}
