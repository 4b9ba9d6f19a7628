//! # Tools Module
//!
//! Capabilities the research agent exposes to workflow steps:
//! - `search`: query classification + provider dispatch + result enrichment
//! - `tavily` / `duckduckgo`: search providers
//! - `summary`, `translate`, `lookup`: text and data tools
//! - `llm`: optional language model backing summaries and translations
//!
//! Every capability call is reported as a [`ToolResult`] carrying success,
//! error message and execution time.

pub mod duckduckgo;
pub mod llm;
pub mod lookup;
pub mod search;
pub mod summary;
pub mod tavily;
pub mod translate;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

pub use duckduckgo::DuckDuckGoSearch;
pub use llm::{LanguageModel, OllamaModel};
pub use lookup::{CompanyRecord, DataLookupTool, StockRecord};
pub use search::{
    analyze_sentiment, detect_search_type, ProviderQuery, RawHit, ResultDetails, SearchBackend,
    SearchConfig, SearchResponse, SearchResult, SearchTopic, SearchType, Sentiment, SmartSearch,
};
pub use summary::{SummaryOutput, SummaryTool};
pub use tavily::TavilySearch;
pub use translate::{TranslationOutput, TranslationTool};

/// Outcome of one capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult<T> {
    pub tool_name: String,
    pub input: Value,
    pub output: Option<T>,
    /// Seconds spent in the call.
    pub execution_time: f64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl<T> ToolResult<T> {
    /// Build a result from a call that started at `started`.
    pub fn timed(
        tool_name: impl Into<String>,
        input: Value,
        started: Instant,
        outcome: Result<T, ToolError>,
    ) -> Self {
        let execution_time = started.elapsed().as_secs_f64();
        match outcome {
            Ok(output) => Self {
                tool_name: tool_name.into(),
                input,
                output: Some(output),
                execution_time,
                success: true,
                error_message: None,
            },
            Err(e) => Self {
                tool_name: tool_name.into(),
                input,
                output: None,
                execution_time,
                success: false,
                error_message: Some(e.to_string()),
            },
        }
    }

    /// Unwrap the output, turning a failed call back into an error.
    pub fn into_output(self) -> Result<T, ToolError> {
        match (self.success, self.output) {
            (true, Some(output)) => Ok(output),
            _ => Err(ToolError::Execution {
                tool: self.tool_name,
                message: self
                    .error_message
                    .unwrap_or_else(|| "no output produced".to_string()),
            }),
        }
    }
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
