//! # Configuration Module
//!
//! Loads runtime settings from environment variables (and a `.env` file when
//! present). The workflow engine itself never reads the environment; only the
//! binary and [`crate::agent::ResearchAgent::from_config`] consume this.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the research workflow service.
#[derive(Debug, Clone)]
pub struct Config {
    /// The Ollama model to use (e.g., "llama3.2", "qwen2.5")
    pub model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Temperature for LLM responses (0.0 = deterministic, 2.0 = very creative)
    pub temperature: f64,

    /// Tavily API key. Without one, searches go through DuckDuckGo.
    pub tavily_api_key: Option<String>,

    /// Maximum number of results requested per search
    pub max_search_results: usize,

    /// Character budget for generated summaries
    pub summary_max_length: usize,

    /// Worker count of the background task queue
    pub max_concurrent_tasks: usize,

    /// Idle time after which a conversation is dropped
    pub session_timeout: Duration,

    /// Route summaries and translations through the language model
    pub use_llm: bool,

    /// Log level for the application
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            temperature: 0.7,
            tavily_api_key: None,
            max_search_results: 10,
            summary_max_length: 300,
            max_concurrent_tasks: 5,
            // Two hours
            session_timeout: Duration::from_secs(7200),
            use_llm: false,
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; set-but-malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OLLAMA_MODEL") {
            config.model = val;
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Ok(val) = env::var("TEMPERATURE") {
            config.temperature = parse_var("TEMPERATURE", &val, "a floating-point number (e.g., 0.7)")?;
        }

        config.tavily_api_key = env::var("TAVILY_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        if let Ok(val) = env::var("MAX_SEARCH_RESULTS") {
            config.max_search_results = parse_var("MAX_SEARCH_RESULTS", &val, "a positive integer")?;
        }

        if let Ok(val) = env::var("SUMMARY_MAX_LENGTH") {
            config.summary_max_length = parse_var("SUMMARY_MAX_LENGTH", &val, "a positive integer")?;
        }

        if let Ok(val) = env::var("MAX_CONCURRENT_TASKS") {
            config.max_concurrent_tasks = parse_var("MAX_CONCURRENT_TASKS", &val, "a positive integer")?;
        }

        if let Ok(val) = env::var("SESSION_TIMEOUT_SECS") {
            let secs: u64 = parse_var("SESSION_TIMEOUT_SECS", &val, "a number of seconds")?;
            config.session_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = env::var("USE_LLM") {
            config.use_llm = parse_flag(&val)
                .with_context(|| format!("USE_LLM must be true or false, got: {val}"))?;
        }

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Fail fast with a clear error rather than later inside a workflow.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.max_search_results == 0 {
            anyhow::bail!("MAX_SEARCH_RESULTS must be at least 1");
        }

        if self.summary_max_length == 0 {
            anyhow::bail!("SUMMARY_MAX_LENGTH must be at least 1");
        }

        if self.max_concurrent_tasks == 0 {
            anyhow::bail!("MAX_CONCURRENT_TASKS must be at least 1");
        }

        if self.model.is_empty() {
            anyhow::bail!("OLLAMA_MODEL cannot be empty");
        }

        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str, expected: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{name} must be {expected}, got: {value}"))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
