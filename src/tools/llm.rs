//! Language model access.
//!
//! Summaries and translations go through a [`LanguageModel`] when one is
//! configured. The Ollama implementation is built on Rig's agent builder.

use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::ollama;
use tracing::debug;

use crate::error::ToolError;

const ASSISTANT_PREAMBLE: &str = r#"
You are a precise research assistant. Answer using only the provided context.
Keep answers short and factual. Reply in the language the instruction asks for.
"#;

/// Turn a prompt plus retrieved context into text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, context: &str) -> Result<String, ToolError>;
}

/// Ollama-hosted model through Rig.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    model: String,
    host: String,
    temperature: f64,
}

impl OllamaModel {
    pub fn new(model: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            host: host.into(),
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str, context: &str) -> Result<String, ToolError> {
        // Rig's Ollama client reads its base URL from the environment.
        std::env::set_var("OLLAMA_API_BASE_URL", &self.host);
        let client = ollama::Client::from_env();

        let agent = client
            .agent(&self.model)
            .preamble(ASSISTANT_PREAMBLE)
            .temperature(self.temperature)
            .build();

        let message = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{prompt}\n\nContext:\n{context}")
        };

        debug!(model = %self.model, prompt_chars = message.len(), "Sending prompt to Ollama");

        agent
            .prompt(message.as_str())
            .await
            .map(|text| text.trim().to_string())
            .map_err(|e| ToolError::Llm(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(OllamaModel: Send, Sync);

    #[test]
    fn test_builder() {
        let model = OllamaModel::new("llama3.2", "http://localhost:11434").with_temperature(0.2);
        assert_eq!(model.model(), "llama3.2");
        assert_eq!(model.temperature, 0.2);
    }
}
